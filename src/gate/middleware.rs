use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, info, warn};

use super::{Decision, Gate, RouteMatcher};
use crate::identity::{Credentials, Principal, RequestContext, SessionStore};
use crate::readiness::Readiness;

/// Everything the middleware needs, cloned into each request.
#[derive(Clone)]
pub struct GateState {
    pub gate: Gate,
    pub matcher: Arc<RouteMatcher>,
    pub sessions: Arc<dyn SessionStore>,
    pub readiness: Readiness,
    pub lookup_timeout: Duration,
}

/// Resolve the caller's principal, failing closed: backend errors, an unready
/// backend and timeouts all come back as `None`.
pub async fn resolve_principal(
    sessions: &dyn SessionStore,
    readiness: &Readiness,
    credentials: &Credentials,
    limit: Duration,
) -> Option<Principal> {
    if credentials.is_empty() {
        return None;
    }
    // Readiness and lookup share one budget.
    let started = tokio::time::Instant::now();
    if !readiness.wait_ready_timeout(limit).await {
        warn!(target: "authz", timeout_ms = limit.as_millis() as u64, "session backend not ready, treating request as unauthenticated");
        return None;
    }
    let remaining = limit.saturating_sub(started.elapsed());
    match tokio::time::timeout(remaining, sessions.resolve_principal(credentials)).await {
        Ok(Ok(principal)) => principal,
        Ok(Err(e)) => {
            warn!(target: "authz", error = %e, "session lookup failed, treating request as unauthenticated");
            None
        }
        Err(_) => {
            warn!(target: "authz", timeout_ms = limit.as_millis() as u64, "session lookup timed out, treating request as unauthenticated");
            None
        }
    }
}

fn sign_in_location(sign_in: &str, original: &str) -> String {
    format!("{}?callbackUrl={}", sign_in, urlencoding::encode(original))
}

pub async fn authorization_middleware(
    State(state): State<GateState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !state.matcher.is_gated(&path) {
        req.extensions_mut().insert(RequestContext::new(None));
        return next.run(req).await;
    }

    let credentials = Credentials::from_headers(req.headers());
    let principal = resolve_principal(
        state.sessions.as_ref(),
        &state.readiness,
        &credentials,
        state.lookup_timeout,
    )
    .await;
    let subject = principal.as_ref().map(|p| p.subject_id().to_string()).unwrap_or_default();

    match state.gate.authorize(&path, principal.as_ref()) {
        Decision::Allow => {
            let ctx = RequestContext::new(principal);
            debug!(target: "authz", %path, %subject, request_id = %ctx.request_id, "allow");
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Decision::RedirectUnauthenticated { target } => {
            let original = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| path.clone());
            info!(target: "authz", %path, "redirect to sign-in");
            Redirect::to(&sign_in_location(&target, &original)).into_response()
        }
        Decision::RedirectForbidden { target, reason } => {
            info!(target: "authz", %path, %subject, reason = reason.as_str(), "forbidden");
            Redirect::to(&target).into_response()
        }
    }
}

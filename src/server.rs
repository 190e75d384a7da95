//!
//! Invitely HTTP server
//! --------------------
//! Axum router with the authorization gate in front of every route.
//!
//! Responsibilities:
//! - Cookie sessions issued by `/auth/login` and dropped by `/auth/logout`.
//! - Public pages (health, sign-in, unauthorized) that the gate skips or allows.
//! - Gated feature routes. These are placeholders for the app's real handlers and
//!   only report who got through; the gate has already run when they execute.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::gate::{authorization_middleware, Gate, GateState};
use crate::identity::{
    AuthProvider, Credentials, InMemorySessionStore, LocalAuthProvider, LoginRequest, RequestContext,
    UserDirectory, SESSION_COOKIE,
};
use crate::readiness::Readiness;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<LocalAuthProvider>,
    pub sessions: InMemorySessionStore,
    pub readiness: Readiness,
    pub gate: GateState,
}

impl AppState {
    /// Wire the policy table, route matcher and session store from config. The
    /// returned state is not ready; call `readiness.mark_ready()` once serving.
    pub fn from_config(cfg: &AppConfig, users: UserDirectory) -> anyhow::Result<Self> {
        let table = cfg.load_policy().context("loading policy table")?;
        let matcher = cfg.route_matcher().context("compiling route matcher")?;
        let sessions = InMemorySessionStore::new(cfg.session_ttl);
        let readiness = Readiness::new();
        let gate = GateState {
            gate: Gate::new(table, cfg.paths.clone()),
            matcher: Arc::new(matcher),
            sessions: Arc::new(sessions.clone()),
            readiness: readiness.clone(),
            lookup_timeout: cfg.session_lookup_timeout,
        };
        let auth = Arc::new(LocalAuthProvider::new(users, sessions.clone()));
        Ok(Self { auth, sessions, readiness, gate })
    }
}

/// Exact paths `build_router` serves besides the sign-in and unauthorized pages.
/// Those two are configurable and must not land on one of these.
pub const FIXED_ROUTES: &[&str] = &[
    "/",
    "/health",
    "/auth/login",
    "/auth/logout",
    "/dashboard",
    "/messaging",
    "/settings",
    "/user-management/users",
    "/me",
];

pub fn build_router(state: AppState) -> Router {
    let gate_state = state.gate.clone();
    let paths = gate_state.gate.paths().clone();
    Router::new()
        .route("/health", get(health))
        .route(&paths.sign_in, get(sign_in_page))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route(&paths.unauthorized, get(unauthorized_page))
        .route("/", get(home))
        .route("/dashboard", get(feature))
        .route("/events/{id}", get(feature_item))
        .route("/guests/{id}", get(feature_item))
        .route("/templates/{id}", get(feature_item))
        .route("/messaging", get(feature))
        .route("/settings", get(feature))
        .route("/user-management/users", get(feature))
        .route("/me", get(me))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(gate_state, authorization_middleware))
        .with_state(state)
}

/// Start the server on the configured address and serve until ctrl-c.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let users = match &cfg.users_file {
        Some(path) => UserDirectory::load(path)?,
        None => UserDirectory::default(),
    };
    if users.is_empty() {
        warn!(target: "startup", "user directory is empty; nobody can sign in");
    }
    let state = AppState::from_config(&cfg, users)?;
    info!(
        target: "startup",
        policy_entries = state.gate.gate.table().entries().len(),
        unmatched = ?state.gate.gate.table().unmatched(),
        sign_in = %cfg.paths.sign_in,
        unauthorized = %cfg.paths.unauthorized,
        "authorization gate configured"
    );
    let readiness = state.readiness.clone();
    let app = build_router(state);

    let addr = cfg.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Starting server on {}", addr);
    readiness.mark_ready();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;
    Ok(())
}

fn session_cookie(token: &str, ttl: Duration) -> AppResult<HeaderValue> {
    // HttpOnly cookie scoped to path / with SameSite=Lax so the sign-in redirect keeps it
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.as_secs()
    ))
    .map_err(|e| AppError::internal("cookie_encode".to_string(), e.to_string()))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("invitely_session=deleted; Max-Age=0; HttpOnly; Secure; SameSite=Lax; Path=/")
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "ready": state.readiness.is_ready()}))
}

#[derive(Debug, Deserialize)]
struct SignInQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

async fn sign_in_page(Query(q): Query<SignInQuery>) -> impl IntoResponse {
    Json(json!({"status": "sign_in_required", "callbackUrl": q.callback_url}))
}

async fn unauthorized_page() -> AppError {
    AppError::forbidden("unauthorized", "your account does not have access to that page")
}

async fn not_found(uri: axum::http::Uri) -> AppError {
    AppError::not_found("not_found".to_string(), format!("no route for {}", uri.path()))
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> AppResult<impl IntoResponse> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::user("missing_credentials", "email and password are required"));
    }
    // Argon2 verification is CPU-bound; keep it off the async workers.
    let auth = state.auth.clone();
    let resp = tokio::task::spawn_blocking(move || auth.login(&payload))
        .await
        .map_err(|e| AppError::internal("login_task".to_string(), e.to_string()))??;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&resp.session.token, state.sessions.ttl())?);
    let body = json!({
        "status": "ok",
        "subject_id": resp.session.principal.subject_id(),
        "issued_at": resp.session.issued_at,
    });
    Ok((StatusCode::OK, headers, Json(body)))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let creds = Credentials::from_headers(&headers);
    let removed = creds.token().map(|t| state.sessions.logout(t)).unwrap_or(false);
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status": "ok", "ended": removed})))
}

fn who(ctx: &RequestContext) -> serde_json::Value {
    json!({
        "subject_id": ctx.principal.as_ref().map(|p| p.subject_id()),
        "role": ctx.principal.as_ref().and_then(|p| p.role()),
        "request_id": ctx.request_id,
    })
}

async fn home(Extension(ctx): Extension<RequestContext>) -> impl IntoResponse {
    Json(json!({"status": "ok", "page": "/", "viewer": who(&ctx)}))
}

async fn feature(Extension(ctx): Extension<RequestContext>, uri: axum::http::Uri) -> impl IntoResponse {
    Json(json!({"status": "ok", "page": uri.path(), "viewer": who(&ctx)}))
}

async fn feature_item(
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    uri: axum::http::Uri,
) -> impl IntoResponse {
    Json(json!({"status": "ok", "page": uri.path(), "id": id, "viewer": who(&ctx)}))
}

async fn me(Extension(ctx): Extension<RequestContext>) -> AppResult<impl IntoResponse> {
    let Some(principal) = ctx.principal else {
        return Err(AppError::auth("unauthenticated", "no principal on request"));
    };
    Ok(Json(json!({"status": "ok", "principal": principal, "request_id": ctx.request_id})))
}

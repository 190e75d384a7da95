//! Authorization gate.
//!
//! [`Gate::authorize`] turns a request path plus an optional principal into a
//! [`Decision`]. It is a pure function of its inputs: the only I/O on the
//! request path (resolving the principal) happens in [`middleware`] before it
//! is called.
//!
//! Evaluation order:
//! 1. the unauthorized page itself is always allowed (no redirect loop)
//! 2. no principal: redirect to sign-in
//! 3. no usable role: redirect to unauthorized
//! 4. account not ACTIVE: redirect to unauthorized
//! 5. elevated role: allow
//! 6. longest matching prefix in the policy table decides

use std::sync::Arc;

use serde::Serialize;

use crate::identity::Principal;
use crate::policy::{normalize_path, PolicyTable, PolicyVerdict, UnmatchedPolicy};

pub mod matcher;
pub mod middleware;

pub use matcher::RouteMatcher;
pub use middleware::{authorization_middleware, resolve_principal, GateState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    MissingRole,
    InactiveAccount,
    RoleNotPermitted,
    NoMatchingPolicy,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::MissingRole => "missing_role",
            DenyReason::InactiveAccount => "inactive_account",
            DenyReason::RoleNotPermitted => "role_not_permitted",
            DenyReason::NoMatchingPolicy => "no_matching_policy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectUnauthenticated { target: String },
    RedirectForbidden { target: String, reason: DenyReason },
}

impl Decision {
    pub fn is_allow(&self) -> bool { matches!(self, Decision::Allow) }

    pub fn target(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::RedirectUnauthenticated { target } | Decision::RedirectForbidden { target, .. } => Some(target),
        }
    }
}

/// Where the gate sends people it turns away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePaths {
    pub sign_in: String,
    pub unauthorized: String,
}

impl Default for GatePaths {
    fn default() -> Self {
        Self { sign_in: "/auth/signin".to_string(), unauthorized: "/unauthorized".to_string() }
    }
}

#[derive(Debug, Clone)]
pub struct Gate {
    table: Arc<PolicyTable>,
    paths: GatePaths,
}

impl Gate {
    pub fn new(table: Arc<PolicyTable>, paths: GatePaths) -> Self {
        Self { table, paths }
    }

    pub fn table(&self) -> &PolicyTable { &self.table }
    pub fn paths(&self) -> &GatePaths { &self.paths }

    pub fn authorize(&self, path: &str, principal: Option<&Principal>) -> Decision {
        if normalize_path(path) == self.paths.unauthorized {
            return Decision::Allow;
        }
        let Some(principal) = principal else {
            return Decision::RedirectUnauthenticated { target: self.paths.sign_in.clone() };
        };
        let Some(role) = principal.role() else {
            return self.forbid(DenyReason::MissingRole);
        };
        if !principal.status().is_active() {
            return self.forbid(DenyReason::InactiveAccount);
        }
        if self.table.is_elevated(role) {
            return Decision::Allow;
        }
        match self.table.permits(path, role) {
            PolicyVerdict::Permitted => Decision::Allow,
            PolicyVerdict::NotPermitted => self.forbid(DenyReason::RoleNotPermitted),
            PolicyVerdict::NoPolicy => match self.table.unmatched() {
                UnmatchedPolicy::Allow => Decision::Allow,
                UnmatchedPolicy::Deny => self.forbid(DenyReason::NoMatchingPolicy),
            },
        }
    }

    fn forbid(&self, reason: DenyReason) -> Decision {
        Decision::RedirectForbidden { target: self.paths.unauthorized.clone(), reason }
    }
}

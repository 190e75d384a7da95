use uuid::Uuid;

use super::Principal;

/// Attached to request extensions by the authorization middleware once a
/// request is allowed through.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(principal: Option<Principal>) -> Self {
        Self { principal, request_id: Uuid::new_v4().to_string() }
    }
}

impl Default for RequestContext {
    fn default() -> Self { Self::new(None) }
}

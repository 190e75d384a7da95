//! Identity and session handling: who is making the request and with which role.
//! Keep the public surface thin and split implementation across sub-modules.

mod role;
mod principal;
mod session;
mod provider;
mod request_context;

pub use role::Role;
pub use principal::{AccountStatus, Principal, SessionRecord};
pub use session::{Credentials, InMemorySessionStore, Session, SessionStore, SessionToken, SESSION_COOKIE};
pub use provider::{hash_password, AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse, UserAccount, UserDirectory};
pub use request_context::RequestContext;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("session record has no subject id")]
    MissingSubject,
    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend unavailable: {0}")]
    Unavailable(String),
    #[error("session ttl {0:?} is out of range")]
    TtlOutOfRange(std::time::Duration),
    #[error("malformed session record: {0}")]
    Malformed(#[from] IdentityError),
}

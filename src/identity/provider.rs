use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::principal::{AccountStatus, SessionRecord};
use super::session::{InMemorySessionStore, Session};
use super::SessionError;
use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

/// A stored account. `password_hash` is an Argon2 PHC string. The role is kept
/// as written so an unknown name only costs that user access instead of failing
/// the whole directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub subject_id: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Option<String>,
    pub status: AccountStatus,
}

impl UserAccount {
    /// The account as an unvalidated identity record for the session store.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            subject_id: Some(self.subject_id.clone()),
            role: self.role.clone(),
            status: Some(self.status.as_str().to_string()),
        }
    }
}

/// Accounts keyed by lower-cased email.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    by_email: HashMap<String, UserAccount>,
}

impl UserDirectory {
    pub fn new(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        let by_email = accounts
            .into_iter()
            .map(|a| (a.email.trim().to_lowercase(), a))
            .collect();
        Self { by_email }
    }

    /// Load a JSON array of accounts.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading user directory {}", path.display()))?;
        let accounts: Vec<UserAccount> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing user directory {}", path.display()))?;
        Ok(Self::new(accounts))
    }

    pub fn find(&self, email: &str) -> Option<&UserAccount> {
        self.by_email.get(&email.trim().to_lowercase())
    }

    pub fn len(&self) -> usize { self.by_email.len() }
    pub fn is_empty(&self) -> bool { self.by_email.is_empty() }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

pub trait AuthProvider: Send + Sync {
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AppError>;
}

pub struct LocalAuthProvider {
    pub users: UserDirectory,
    pub sessions: InMemorySessionStore,
}

impl LocalAuthProvider {
    pub fn new(users: UserDirectory, sessions: InMemorySessionStore) -> Self { Self { users, sessions } }
}

impl AuthProvider for LocalAuthProvider {
    // Account status is not checked here; the gate rejects inactive principals.
    fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AppError> {
        let Some(account) = self.users.find(&req.email) else {
            return Err(AppError::auth("invalid_credentials", "invalid email or password"));
        };
        if !verify_password(&account.password_hash, &req.password) {
            return Err(AppError::auth("invalid_credentials", "invalid email or password"));
        }
        let session = self.sessions.issue_record(account.record()).map_err(|e| match e {
            SessionError::Malformed(e) => AppError::internal("bad_account".to_string(), e.to_string()),
            other => AppError::internal("session_issue_failed".to_string(), other.to_string()),
        })?;
        info!(target: "auth", subject = %account.subject_id, sid = %session.session_id, "login");
        Ok(LoginResponse { session })
    }
}

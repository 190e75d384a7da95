use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use crate::tprintln;

use super::principal::{Principal, SessionRecord};
use super::SessionError;

pub const SESSION_COOKIE: &str = "invitely_session";

pub type SessionToken = String;

/// Transport-level credentials pulled off a request. Either may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub session_token: Option<String>,
    pub bearer_token: Option<String>,
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            session_token: parse_cookie(headers, SESSION_COOKIE),
            bearer_token: parse_bearer(headers),
        }
    }

    /// Cookie wins over bearer when both are sent.
    pub fn token(&self) -> Option<&str> {
        self.session_token.as_deref().or(self.bearer_token.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.session_token.is_none() && self.bearer_token.is_none()
    }
}

pub(crate) fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn parse_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ").or_else(|| raw.strip_prefix("bearer "))?.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

/// Resolves request credentials to a principal. Implementations own their own
/// retry policy; callers treat any error as "no principal".
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve_principal(&self, credentials: &Credentials) -> Result<Option<Principal>, SessionError>;
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Instant,
}

#[derive(Default)]
struct SessionMaps {
    sessions: HashMap<SessionToken, Session>,
    user_index: HashMap<String, HashSet<SessionToken>>,
}

impl SessionMaps {
    fn remove(&mut self, token: &str) -> bool {
        let Some(sess) = self.sessions.remove(token) else { return false };
        let uid = sess.principal.subject_id();
        let now_empty = match self.user_index.get_mut(uid) {
            Some(set) => {
                set.remove(token);
                set.is_empty()
            }
            None => false,
        };
        if now_empty { self.user_index.remove(uid); }
        true
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<SessionToken> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(t, _)| t.clone())
            .collect();
        for t in &expired {
            self.remove(t);
        }
        expired.len()
    }
}

fn gen_id() -> Result<String, SessionError> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| SessionError::Unavailable(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Process-local session store with TTL expiry and per-user revocation.
/// Expired sessions are swept whenever a new one is issued.
#[derive(Clone)]
pub struct InMemorySessionStore {
    ttl: Duration,
    inner: Arc<RwLock<SessionMaps>>,
}

impl Default for InMemorySessionStore {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, inner: Arc::new(RwLock::new(SessionMaps::default())) }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn issue(&self, principal: Principal) -> Result<Session, SessionError> {
        let now = Instant::now();
        let expires_at = now.checked_add(self.ttl).ok_or(SessionError::TtlOutOfRange(self.ttl))?;
        let sid = gen_id()?;
        let token = gen_id()?;
        let sess = Session {
            session_id: sid.clone(),
            token: token.clone(),
            principal: principal.clone(),
            issued_at: Utc::now(),
            expires_at,
        };
        let swept = {
            let mut maps = self.inner.write();
            let swept = maps.sweep(now);
            maps.sessions.insert(token.clone(), sess.clone());
            maps.user_index.entry(principal.subject_id().to_string()).or_default().insert(token);
            swept
        };
        tprintln!("session.issue user={} sid={} ttl_secs={} swept={}", principal.subject_id(), sid, self.ttl.as_secs(), swept);
        Ok(sess)
    }

    /// Issue a session for an upstream identity record, validating it first.
    pub fn issue_record(&self, record: SessionRecord) -> Result<Session, SessionError> {
        let principal = Principal::from_record(record)?;
        self.issue(principal)
    }

    pub fn validate(&self, token: &str) -> Option<Principal> {
        let now = Instant::now();
        let expired = {
            let maps = self.inner.read();
            match maps.sessions.get(token) {
                Some(s) if s.expires_at > now => return Some(s.principal.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.inner.write().remove(token);
        }
        None
    }

    pub fn logout(&self, token: &str) -> bool {
        self.inner.write().remove(token)
    }

    pub fn revoke_user(&self, subject_id: &str) -> usize {
        let mut maps = self.inner.write();
        let tokens = maps.user_index.remove(subject_id).unwrap_or_default();
        let count = tokens.iter().filter(|t| maps.sessions.remove(*t).is_some()).count();
        tprintln!("session.revoke user={} count={}", subject_id, count);
        count
    }

    /// Drop every expired session now; returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.inner.write().sweep(Instant::now())
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.read().sessions.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn resolve_principal(&self, credentials: &Credentials) -> Result<Option<Principal>, SessionError> {
        Ok(credentials.token().and_then(|t| self.validate(t)))
    }
}

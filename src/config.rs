//! Process configuration, read once at startup from `INVITELY_*` environment
//! variables. Unset variables fall back to the defaults below.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::gate::matcher::DEFAULT_PUBLIC_PATTERNS;
use crate::gate::{GatePaths, RouteMatcher};
use crate::policy::{PolicyTable, UnmatchedPolicy};
use crate::server::FIXED_ROUTES;

/// Longest session lifetime accepted from `INVITELY_SESSION_TTL_SECS`.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(366 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },
    #[error(transparent)]
    Policy(#[from] crate::policy::PolicyError),
    #[error("route pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn invalid(var: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { var, message: message.into() }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: IpAddr,
    pub http_port: u16,
    pub paths: GatePaths,
    pub session_lookup_timeout: Duration,
    pub session_ttl: Duration,
    pub policy_file: Option<PathBuf>,
    pub users_file: Option<PathBuf>,
    pub unmatched: Option<UnmatchedPolicy>,
    pub public_patterns: Vec<String>,
    pub protected_patterns: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 7878,
            paths: GatePaths::default(),
            session_lookup_timeout: Duration::from_millis(2000),
            session_ttl: Duration::from_secs(60 * 60),
            policy_file: None,
            users_file: None,
            unmatched: None,
            public_patterns: DEFAULT_PUBLIC_PATTERNS.iter().map(|s| s.to_string()).collect(),
            protected_patterns: Vec::new(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn page_path(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let p = raw.trim();
    if !p.starts_with('/') {
        return Err(invalid(var, format!("'{p}' must start with '/'")));
    }
    if p.contains(['{', '}', '*', '?', '#']) {
        return Err(invalid(var, format!("'{p}' must be a plain path")));
    }
    let trimmed = p.trim_end_matches('/');
    let path = if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() };
    if FIXED_ROUTES.contains(&path.as_str()) {
        return Err(invalid(var, format!("'{path}' is already served by another route")));
    }
    Ok(path)
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary variable source; `from_env` passes the process env.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Result<Self, ConfigError> {
        let mut cfg = AppConfig::default();
        if let Some(v) = get("INVITELY_BIND") {
            cfg.bind = v.trim().parse().map_err(|e| invalid("INVITELY_BIND", format!("{e}")))?;
        }
        if let Some(v) = get("INVITELY_HTTP_PORT") {
            cfg.http_port = v.trim().parse().map_err(|e| invalid("INVITELY_HTTP_PORT", format!("{e}")))?;
        }
        if let Some(v) = get("INVITELY_SIGN_IN_PATH") {
            cfg.paths.sign_in = page_path("INVITELY_SIGN_IN_PATH", &v)?;
        }
        if let Some(v) = get("INVITELY_UNAUTHORIZED_PATH") {
            cfg.paths.unauthorized = page_path("INVITELY_UNAUTHORIZED_PATH", &v)?;
        }
        if let Some(v) = get("INVITELY_SESSION_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|e| invalid("INVITELY_SESSION_TIMEOUT_MS", format!("{e}")))?;
            if ms == 0 {
                return Err(invalid("INVITELY_SESSION_TIMEOUT_MS", "must be greater than zero"));
            }
            cfg.session_lookup_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = get("INVITELY_SESSION_TTL_SECS") {
            let secs: u64 = v.trim().parse().map_err(|e| invalid("INVITELY_SESSION_TTL_SECS", format!("{e}")))?;
            let ttl = Duration::from_secs(secs);
            if ttl > MAX_SESSION_TTL {
                return Err(invalid(
                    "INVITELY_SESSION_TTL_SECS",
                    format!("must be at most {} seconds", MAX_SESSION_TTL.as_secs()),
                ));
            }
            cfg.session_ttl = ttl;
        }
        if let Some(v) = get("INVITELY_POLICY_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.policy_file = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("INVITELY_USERS_FILE").filter(|v| !v.trim().is_empty()) {
            cfg.users_file = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = get("INVITELY_UNMATCHED") {
            cfg.unmatched = Some(v.parse().map_err(|e: String| invalid("INVITELY_UNMATCHED", e))?);
        }
        if let Some(v) = get("INVITELY_PUBLIC_PATHS") {
            cfg.public_patterns = split_list(&v);
        }
        if let Some(v) = get("INVITELY_PROTECTED_PATHS") {
            cfg.protected_patterns = split_list(&v);
        }
        if cfg.paths.sign_in == cfg.paths.unauthorized {
            return Err(invalid("INVITELY_SIGN_IN_PATH", "sign-in and unauthorized pages must differ"));
        }
        Ok(cfg)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.http_port)
    }

    /// The policy file when configured, otherwise the built-in table. An explicit
    /// `INVITELY_UNMATCHED` overrides whatever the table says.
    pub fn load_policy(&self) -> Result<Arc<PolicyTable>, ConfigError> {
        let table = match &self.policy_file {
            Some(path) => PolicyTable::load(path)?,
            None => PolicyTable::default(),
        };
        let table = match self.unmatched {
            Some(u) => table.with_unmatched(u),
            None => table,
        };
        Ok(Arc::new(table))
    }

    /// The sign-in page and the login endpoint are always public, whatever the
    /// pattern lists say.
    pub fn route_matcher(&self) -> Result<RouteMatcher, ConfigError> {
        let mut public = self.public_patterns.clone();
        public.push(format!("^{}$", regex::escape(&self.paths.sign_in)));
        public.push("^/auth/login$".to_string());
        Ok(RouteMatcher::new(&public, &self.protected_patterns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.http_port, 7878);
        assert_eq!(cfg.paths, GatePaths::default());
        assert_eq!(cfg.session_lookup_timeout, Duration::from_secs(2));
        assert!(cfg.policy_file.is_none());
        assert!(cfg.unmatched.is_none());
        assert!(cfg.route_matcher().unwrap().is_public("/health"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("INVITELY_HTTP_PORT", "9000"),
            ("INVITELY_BIND", "127.0.0.1"),
            ("INVITELY_SIGN_IN_PATH", "/login/"),
            ("INVITELY_UNAUTHORIZED_PATH", "/denied"),
            ("INVITELY_SESSION_TIMEOUT_MS", "250"),
            ("INVITELY_UNMATCHED", "allow"),
            ("INVITELY_PUBLIC_PATHS", "^/health$, ^/login"),
        ]))
        .unwrap();
        assert_eq!(cfg.socket_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.paths.sign_in, "/login");
        assert_eq!(cfg.paths.unauthorized, "/denied");
        assert_eq!(cfg.session_lookup_timeout, Duration::from_millis(250));
        assert_eq!(cfg.unmatched, Some(UnmatchedPolicy::Allow));
        assert_eq!(cfg.public_patterns, vec!["^/health$".to_string(), "^/login".to_string()]);
        assert_eq!(cfg.load_policy().unwrap().unmatched(), UnmatchedPolicy::Allow);
        let m = cfg.route_matcher().unwrap();
        assert!(!m.is_gated("/login"));
        assert!(m.is_gated("/denied"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_HTTP_PORT", "lots")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SESSION_TIMEOUT_MS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SIGN_IN_PATH", "login")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_UNMATCHED", "sometimes")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SIGN_IN_PATH", "/x"), ("INVITELY_UNAUTHORIZED_PATH", "/x")])).is_err());
    }

    #[test]
    fn ttl_is_capped() {
        let err = AppConfig::from_lookup(lookup(&[("INVITELY_SESSION_TTL_SECS", "18446744073709551615")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "INVITELY_SESSION_TTL_SECS", .. }));
        let too_long = (MAX_SESSION_TTL.as_secs() + 1).to_string();
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SESSION_TTL_SECS", &too_long)])).is_err());
        let cfg = AppConfig::from_lookup(lookup(&[("INVITELY_SESSION_TTL_SECS", "86400")])).unwrap();
        assert_eq!(cfg.session_ttl, Duration::from_secs(86400));
    }

    #[test]
    fn page_paths_cannot_shadow_other_routes() {
        for taken in ["/messaging", "/health", "/auth/login", "/dashboard/", "/"] {
            let err = AppConfig::from_lookup(lookup(&[("INVITELY_UNAUTHORIZED_PATH", taken)])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { var: "INVITELY_UNAUTHORIZED_PATH", .. }), "{taken}");
        }
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SIGN_IN_PATH", "/auth/logout")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SIGN_IN_PATH", "/events/{id}")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("INVITELY_SIGN_IN_PATH", "/login")])).is_ok());
    }

    #[test]
    fn login_endpoint_stays_public_when_lists_are_overridden() {
        let cfg = AppConfig::from_lookup(lookup(&[("INVITELY_PUBLIC_PATHS", "^/health$")])).unwrap();
        let m = cfg.route_matcher().unwrap();
        assert!(!m.is_gated("/auth/login"));
        assert!(!m.is_gated("/auth/signin"));
        assert!(m.is_gated("/auth/logout"));
    }

    #[test]
    fn policy_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"routes":[{"prefix":"/events","roles":["host"]}]}"#).unwrap();
        let cfg = AppConfig::from_lookup(lookup(&[("INVITELY_POLICY_FILE", path.to_str().unwrap())])).unwrap();
        let table = cfg.load_policy().unwrap();
        assert_eq!(table.entries().len(), 1);
        assert_eq!(table.unmatched(), UnmatchedPolicy::Deny);
    }
}

use regex::Regex;

/// Decides which request paths go through the gate at all.
///
/// Public patterns win. With no protected patterns configured, everything not
/// public is gated.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    public: Vec<Regex>,
    protected: Vec<Regex>,
}

pub const DEFAULT_PUBLIC_PATTERNS: &[&str] = &[
    r"^/_next/",
    r"^/static/",
    r"^/favicon\.ico$",
    r"^/health$",
    r"^/auth(/|$)",
    r"^/api/auth(/|$)",
];

impl RouteMatcher {
    pub fn new<P: AsRef<str>, Q: AsRef<str>>(public: &[P], protected: &[Q]) -> Result<Self, regex::Error> {
        let compile = |pats: &[&str]| pats.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>();
        let public: Vec<&str> = public.iter().map(|p| p.as_ref()).collect();
        let protected: Vec<&str> = protected.iter().map(|p| p.as_ref()).collect();
        Ok(Self { public: compile(&public)?, protected: compile(&protected)? })
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|r| r.is_match(path))
    }

    pub fn is_gated(&self, path: &str) -> bool {
        if self.is_public(path) {
            return false;
        }
        self.protected.is_empty() || self.protected.iter().any(|r| r.is_match(path))
    }
}

impl Default for RouteMatcher {
    fn default() -> Self {
        Self {
            public: DEFAULT_PUBLIC_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
            protected: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_skip_assets_and_auth_pages() {
        let m = RouteMatcher::default();
        for p in ["/_next/static/chunk.js", "/favicon.ico", "/health", "/auth/signin", "/auth", "/api/auth/session"] {
            assert!(!m.is_gated(p), "{p} should be public");
        }
        for p in ["/", "/dashboard", "/authors", "/events/1", "/healthz"] {
            assert!(m.is_gated(p), "{p} should be gated");
        }
    }

    #[test]
    fn protected_list_narrows_the_gate() {
        let m = RouteMatcher::new(&[r"^/health$"], &[r"^/events(/|$)", r"^/templates(/|$)"]).unwrap();
        assert!(m.is_gated("/events/7"));
        assert!(m.is_gated("/templates"));
        assert!(!m.is_gated("/about"));
        assert!(!m.is_gated("/health"));
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let empty: [&str; 0] = [];
        assert!(RouteMatcher::new(&["(unclosed"], &empty).is_err());
    }
}

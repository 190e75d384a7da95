//! Role/route policy table.
//!
//! Maps URL path prefixes to the roles allowed under them. Lookup is
//! longest-prefix-wins and segment aware: `/templates` covers `/templates` and
//! `/templates/42`, but not `/templates-archive`. The root `/` covers every path.
//!
//! Elevated roles are a separate tier that bypasses the table entirely; they do
//! not need to appear in any entry.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::identity::Role;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy prefix '{0}' must start with '/'")]
    InvalidPrefix(String),
    #[error("policy prefix '{0}' is declared more than once")]
    DuplicatePrefix(String),
    #[error("reading policy file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("parsing policy document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What happens to a path that no entry covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    #[default]
    Deny,
    Allow,
}

impl std::str::FromStr for UnmatchedPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deny" => Ok(UnmatchedPolicy::Deny),
            "allow" => Ok(UnmatchedPolicy::Allow),
            other => Err(format!("expected 'deny' or 'allow', got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub prefix: String,
    #[serde(default)]
    pub roles: BTreeSet<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVerdict {
    Permitted,
    NotPermitted,
    NoPolicy,
}

/// Serialized form of a policy table, as read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default = "default_elevated")]
    pub elevated: BTreeSet<Role>,
    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
    pub routes: Vec<PolicyEntry>,
}

fn default_elevated() -> BTreeSet<Role> {
    BTreeSet::from([Role::SuperAdmin, Role::ApplicationAdmin])
}

#[derive(Debug, Clone)]
pub struct PolicyTable {
    // Kept sorted by prefix length, longest first, so the first hit wins.
    entries: Vec<PolicyEntry>,
    elevated: BTreeSet<Role>,
    unmatched: UnmatchedPolicy,
}

fn normalize_prefix(prefix: &str) -> Result<String, PolicyError> {
    let p = prefix.trim();
    if !p.starts_with('/') {
        return Err(PolicyError::InvalidPrefix(prefix.to_string()));
    }
    let trimmed = p.trim_end_matches('/');
    Ok(if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() })
}

/// Strip query string and fragment, and collapse runs of `/` so `//templates`
/// cannot slip past the `/templates` entry.
pub fn normalize_path(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let mut out = String::with_capacity(end);
    for c in path[..end].chars() {
        if c == '/' && out.ends_with('/') { continue; }
        out.push(c);
    }
    if out.is_empty() { out.push('/'); }
    out
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl PolicyTable {
    pub fn new(
        entries: impl IntoIterator<Item = PolicyEntry>,
        elevated: BTreeSet<Role>,
        unmatched: UnmatchedPolicy,
    ) -> Result<Self, PolicyError> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for entry in entries {
            let prefix = normalize_prefix(&entry.prefix)?;
            if !seen.insert(prefix.clone()) {
                return Err(PolicyError::DuplicatePrefix(prefix));
            }
            out.push(PolicyEntry { prefix, roles: entry.roles });
        }
        // Stable sort keeps declaration order among equal lengths; prefixes are unique
        // so that order never decides a match.
        out.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { entries: out, elevated, unmatched })
    }

    pub fn from_document(doc: PolicyDocument) -> Result<Self, PolicyError> {
        Self::new(doc.routes, doc.elevated, doc.unmatched)
    }

    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_json::from_str(raw)?;
        Self::from_document(doc)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| PolicyError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&raw)
    }

    /// Most specific entry covering `path`, if any.
    pub fn lookup(&self, path: &str) -> Option<&PolicyEntry> {
        let path = normalize_path(path);
        self.entries.iter().find(|e| prefix_matches(&e.prefix, &path))
    }

    pub fn permits(&self, path: &str, role: Role) -> PolicyVerdict {
        match self.lookup(path) {
            Some(entry) if entry.roles.contains(&role) => PolicyVerdict::Permitted,
            Some(_) => PolicyVerdict::NotPermitted,
            None => PolicyVerdict::NoPolicy,
        }
    }

    pub fn is_elevated(&self, role: Role) -> bool {
        self.elevated.contains(&role)
    }

    pub fn unmatched(&self) -> UnmatchedPolicy { self.unmatched }

    pub fn entries(&self) -> &[PolicyEntry] { &self.entries }

    pub fn with_unmatched(mut self, unmatched: UnmatchedPolicy) -> Self {
        self.unmatched = unmatched;
        self
    }
}

impl Default for PolicyTable {
    /// Route table for the invitation app.
    fn default() -> Self {
        use Role::*;
        let entry = |prefix: &str, roles: &[Role]| PolicyEntry {
            prefix: prefix.to_string(),
            roles: roles.iter().copied().collect(),
        };
        let mut entries = vec![
            entry("/", &[Host, Attendee, SuperAdmin, ApplicationAdmin]),
            entry("/dashboard", &[Host, Attendee]),
            entry("/events", &[Host, Attendee]),
            entry("/guests", &[Host]),
            entry("/messaging", &[Host]),
            entry("/settings", &[Host]),
            entry("/templates", &[SuperAdmin, ApplicationAdmin]),
            entry("/user-management", &[SuperAdmin, ApplicationAdmin]),
        ];
        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { entries, elevated: default_elevated(), unmatched: UnmatchedPolicy::Deny }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(rs: &[Role]) -> BTreeSet<Role> { rs.iter().copied().collect() }

    fn entry(prefix: &str, rs: &[Role]) -> PolicyEntry {
        PolicyEntry { prefix: prefix.into(), roles: roles(rs) }
    }

    #[test]
    fn longest_prefix_wins() {
        let t = PolicyTable::new(
            vec![
                entry("/", &[Role::Host, Role::Attendee]),
                entry("/templates", &[Role::SuperAdmin]),
            ],
            default_elevated(),
            UnmatchedPolicy::Deny,
        )
        .unwrap();
        assert_eq!(t.lookup("/templates/123").unwrap().prefix, "/templates");
        assert_eq!(t.lookup("/events/123").unwrap().prefix, "/");
        assert_eq!(t.permits("/templates/123", Role::Host), PolicyVerdict::NotPermitted);
        assert_eq!(t.permits("/events/123", Role::Host), PolicyVerdict::Permitted);
    }

    #[test]
    fn matching_is_segment_aware() {
        let t = PolicyTable::new(vec![entry("/templates", &[Role::Host])], BTreeSet::new(), UnmatchedPolicy::Deny).unwrap();
        assert!(t.lookup("/templates").is_some());
        assert!(t.lookup("/templates/").is_some());
        assert!(t.lookup("/templates?page=2").is_some());
        assert!(t.lookup("//templates/1").is_some());
        assert!(t.lookup("/templates-archive").is_none());
        assert_eq!(t.permits("/other", Role::Host), PolicyVerdict::NoPolicy);
    }

    #[test]
    fn prefixes_are_normalized_and_validated() {
        let t = PolicyTable::new(vec![entry("/guests/", &[Role::Host])], BTreeSet::new(), UnmatchedPolicy::Deny).unwrap();
        assert_eq!(t.entries()[0].prefix, "/guests");

        let err = PolicyTable::new(vec![entry("guests", &[])], BTreeSet::new(), UnmatchedPolicy::Deny).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPrefix(_)));

        let err = PolicyTable::new(
            vec![entry("/guests", &[]), entry("/guests/", &[Role::Host])],
            BTreeSet::new(),
            UnmatchedPolicy::Deny,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicatePrefix(p) if p == "/guests"));
    }

    #[test]
    fn default_table_covers_app_routes() {
        let t = PolicyTable::default();
        assert_eq!(t.permits("/messaging", Role::Host), PolicyVerdict::Permitted);
        assert_eq!(t.permits("/messaging", Role::Attendee), PolicyVerdict::NotPermitted);
        assert_eq!(t.permits("/user-management/users", Role::Host), PolicyVerdict::NotPermitted);
        assert_eq!(t.permits("/anything-else", Role::Attendee), PolicyVerdict::Permitted);
        assert!(t.is_elevated(Role::SuperAdmin));
        assert!(t.is_elevated(Role::ApplicationAdmin));
        assert!(!t.is_elevated(Role::Host));
        assert_eq!(t.unmatched(), UnmatchedPolicy::Deny);
    }

    #[test]
    fn document_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{
                "unmatched": "allow",
                "routes": [
                    {"prefix": "/events", "roles": ["host", "ATTENDEE"]},
                    {"prefix": "/messaging", "roles": ["host"]}
                ]
            }"#,
        )
        .unwrap();
        let t = PolicyTable::load(&path).unwrap();
        assert_eq!(t.unmatched(), UnmatchedPolicy::Allow);
        assert!(t.is_elevated(Role::SuperAdmin));
        assert_eq!(t.permits("/events/9", Role::Attendee), PolicyVerdict::Permitted);
        assert_eq!(t.permits("/dashboard", Role::Host), PolicyVerdict::NoPolicy);
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let missing = PolicyTable::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(missing, PolicyError::Io { .. }));
        let bad = PolicyTable::from_json("{ not json").unwrap_err();
        assert!(matches!(bad, PolicyError::Parse(_)));
        let bad_role = PolicyTable::from_json(r#"{"routes":[{"prefix":"/","roles":["owner"]}]}"#).unwrap_err();
        assert!(matches!(bad_role, PolicyError::Parse(_)));
    }

    #[test]
    fn unmatched_policy_parses() {
        assert_eq!("DENY".parse::<UnmatchedPolicy>().unwrap(), UnmatchedPolicy::Deny);
        assert_eq!(" allow ".parse::<UnmatchedPolicy>().unwrap(), UnmatchedPolicy::Allow);
        assert!("maybe".parse::<UnmatchedPolicy>().is_err());
    }
}

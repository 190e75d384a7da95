use serde::{Deserialize, Serialize};

use super::{IdentityError, Role};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
    /// Anything upstream sent that we do not recognise. Never treated as active.
    Other(String),
}

impl AccountStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => AccountStatus::Active,
            "INACTIVE" => AccountStatus::Inactive,
            "SUSPENDED" => AccountStatus::Suspended,
            "PENDING" => AccountStatus::Pending,
            _ => AccountStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Inactive => "INACTIVE",
            AccountStatus::Suspended => "SUSPENDED",
            AccountStatus::Pending => "PENDING",
            AccountStatus::Other(s) => s.as_str(),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AccountStatus::Active)
    }
}

impl Serialize for AccountStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AccountStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AccountStatus::parse(&raw))
    }
}

/// Raw identity as handed over by an upstream session backend. Untrusted until
/// converted with [`Principal::from_record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Authenticated identity attached to one request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Principal {
    subject_id: String,
    role: Option<Role>,
    status: AccountStatus,
}

impl Principal {
    pub fn new(subject_id: impl Into<String>, role: Option<Role>, status: AccountStatus) -> Self {
        Self { subject_id: subject_id.into(), role, status }
    }

    /// Validate an upstream record. A missing subject is an error; an unknown or
    /// missing role becomes `None` and a missing status is not active, so both
    /// are rejected later by the gate rather than here.
    pub fn from_record(record: SessionRecord) -> Result<Self, IdentityError> {
        let subject_id = record
            .subject_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(IdentityError::MissingSubject)?;
        let role = record.role.as_deref().and_then(|r| r.parse::<Role>().ok());
        let status = record
            .status
            .as_deref()
            .map(AccountStatus::parse)
            .unwrap_or_else(|| AccountStatus::Other(String::new()));
        Ok(Self { subject_id, role, status })
    }

    pub fn subject_id(&self) -> &str { &self.subject_id }
    pub fn role(&self) -> Option<Role> { self.role }
    pub fn status(&self) -> &AccountStatus { &self.status }
}

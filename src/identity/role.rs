use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::IdentityError;

/// The closed set of roles a principal can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    SuperAdmin,
    ApplicationAdmin,
    Host,
    Attendee,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::ApplicationAdmin, Role::Host, Role::Attendee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::ApplicationAdmin => "application-admin",
            Role::Host => "host",
            Role::Attendee => "attendee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    /// Accepts `super-admin`, `SUPER_ADMIN`, `Super Admin` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        match norm.as_str() {
            "super-admin" => Ok(Role::SuperAdmin),
            "application-admin" => Ok(Role::ApplicationAdmin),
            "host" => Ok(Role::Host),
            "attendee" => Ok(Role::Attendee),
            _ => Err(IdentityError::UnknownRole(s.to_string())),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

//! Identity Model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Citizen,
    Authority,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Authority => "authority",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "citizen" => Ok(Self::Citizen),
            "authority" => Ok(Self::Authority),
            "admin" => Ok(Self::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// Durable person record; `(role, email)` is unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub email: String,
    pub name: String,
    pub mobile: String,
    pub zone: String,
    /// Argon2 hash; random and never disclosed for on-demand citizens.
    /// Persisted with the record, never returned by the API.
    pub credential_hash: String,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::Citizen, Role::Authority, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert!("mayor".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_survives_storage_roundtrip() {
        let identity = Identity {
            id: "u1".into(),
            role: Role::Citizen,
            email: "a@x.com".into(),
            name: "A".into(),
            mobile: "N/A".into(),
            zone: "Central".into(),
            credential_hash: "$argon2id$secret".into(),
            created_at: 0,
        };
        let json = serde_json::to_vec(&identity).unwrap();
        let back: Identity = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.credential_hash, "$argon2id$secret");
        assert_eq!(back, identity);
    }
}

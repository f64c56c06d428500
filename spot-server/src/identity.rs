//! Citizen identity resolution
//!
//! Anonymous reporters are keyed by email. The first confirmed submission
//! creates a citizen record; later ones reuse it. Creation races are
//! settled by the `(role, email)` index in storage: the loser of an insert
//! race re-reads and returns the winner's record.

use shared::models::{ContactInfo, Identity, Role};
use validator::ValidateEmail;

use crate::clock::SharedClock;
use crate::error::{CoreError, CoreResult};
use crate::storage::{Storage, StorageError};
use crate::util::{hash_password, random_secret};

const DEFAULT_NAME: &str = "Anonymous Citizen";
const DEFAULT_MOBILE: &str = "N/A";

pub struct IdentityResolver {
    storage: Storage,
    clock: SharedClock,
    default_zone: String,
}

impl IdentityResolver {
    pub fn new(storage: Storage, clock: SharedClock, default_zone: impl Into<String>) -> Self {
        Self {
            storage,
            clock,
            default_zone: default_zone.into(),
        }
    }

    /// Find the citizen with this email, creating one on first use
    ///
    /// Email comparison is case-insensitive. The created record gets an
    /// argon2 hash of a random secret as its credential, so it cannot be
    /// logged into until a real password is set elsewhere.
    pub fn resolve(&self, contact: &ContactInfo) -> CoreResult<Identity> {
        let email = normalize_email(&contact.email);
        if !is_valid_email(&email) {
            return Err(CoreError::validation("A valid reporter email is required"));
        }

        if let Some(existing) = self.storage.find_identity_by_email(Role::Citizen, &email)? {
            return Ok(existing);
        }

        let credential_hash = hash_password(&random_secret())
            .map_err(|e| CoreError::Internal(format!("credential hashing failed: {e}")))?;

        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Citizen,
            email: email.clone(),
            name: non_blank(contact.name.as_deref()).unwrap_or(DEFAULT_NAME).to_string(),
            mobile: non_blank(contact.mobile.as_deref())
                .unwrap_or(DEFAULT_MOBILE)
                .to_string(),
            zone: self.default_zone.clone(),
            credential_hash,
            created_at: self.clock.now_millis(),
        };

        match self.storage.insert_identity(&identity) {
            Ok(()) => {
                tracing::info!(identity_id = %identity.id, "Citizen identity created on demand");
                Ok(identity)
            }
            Err(StorageError::Duplicate(_)) => {
                tracing::debug!(email = %email, "Lost identity creation race, re-reading");
                self.storage
                    .find_identity_by_email(Role::Citizen, &email)?
                    .ok_or_else(|| {
                        CoreError::Storage(StorageError::Duplicate(format!(
                            "citizen:{email} reported taken but not found"
                        )))
                    })
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Syntactic check only; ownership is proven by the one-time code
pub fn is_valid_email(email: &str) -> bool {
    email.validate_email()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

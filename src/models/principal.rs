use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user account as held by the credential store.
///
/// `refresh_token_hash` is `None` when the principal has no active session.
/// At most one refresh credential is valid at a time; issuing or rotating
/// overwrites it.
#[derive(Debug, Clone, FromRow)]
pub struct Principal {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
    pub refresh_token_hash: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_active_session(&self) -> bool {
        self.refresh_token_hash.is_some()
    }

    /// Whether the stored reset credential, if any, is still usable at `now`.
    pub fn reset_credential_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.reset_token_hash, self.reset_token_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }

    /// The fields safe to hand back to a client.
    pub fn view(&self) -> PrincipalView {
        PrincipalView {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            created_at: self.created_at,
        }
    }
}

/// Data needed to create a principal. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password_hash: String,
}

/// Sanitized principal returned by the API and cached in the client session.
/// Never carries secrets or hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalView {
    pub id: i32,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

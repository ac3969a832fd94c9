//! Credential persistence.
//!
//! The session subsystem only talks to [`CredentialStore`]. Writes are
//! last-write-wins; the one conditional write is
//! [`CredentialStore::replace_refresh_credential`], used by refresh rotation so
//! two concurrent refreshes of the same token cannot both succeed.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{NewPrincipal, Principal};

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `AppError::Conflict` when the email is already registered.
    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError>;

    async fn get_principal_with_credential(&self, id: i32) -> Result<Option<Principal>, AppError>;

    /// Overwrites the stored refresh hash; `None` revokes the session.
    async fn set_refresh_credential(&self, id: i32, hash: Option<&str>) -> Result<(), AppError>;

    /// Writes `new_hash` only if the stored hash still equals `expected_hash`.
    /// Returns whether the write happened.
    async fn replace_refresh_credential(
        &self,
        id: i32,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AppError>;

    async fn set_reset_credential(
        &self,
        id: i32,
        hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn clear_reset_credential(&self, id: i32) -> Result<(), AppError>;

    async fn find_by_reset_credential(&self, hash: &str) -> Result<Option<Principal>, AppError>;

    /// Stores the new password hash and clears both the reset and the refresh
    /// credential in a single write.
    async fn complete_password_reset(&self, id: i32, password_hash: &str) -> Result<(), AppError>;
}

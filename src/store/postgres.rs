use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::CredentialStore;
use crate::error::AppError;
use crate::models::{NewPrincipal, Principal};

const PRINCIPAL_COLUMNS: &str = "id, email, username, full_name, password_hash, \
     refresh_token_hash, reset_token_hash, reset_token_expires_at, created_at";

/// `CredentialStore` backed by the `principals` table
/// (see `migrations/20240601000000_create_principals.sql`).
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    /// Fails with `NotFound` if no row was touched.
    fn expect_row(rows_affected: u64) -> Result<(), AppError> {
        if rows_affected == 0 {
            return Err(AppError::NotFound("Principal not found".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, AppError> {
        let sql = format!(
            "INSERT INTO principals (email, username, full_name, password_hash) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            PRINCIPAL_COLUMNS
        );
        sqlx::query_as::<_, Principal>(&sql)
            .bind(&new.email)
            .bind(&new.username)
            .bind(&new.full_name)
            .bind(&new.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => AppError::Conflict("Email already registered".into()),
                other => other,
            })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let sql = format!("SELECT {} FROM principals WHERE email = $1", PRINCIPAL_COLUMNS);
        Ok(sqlx::query_as::<_, Principal>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_principal_with_credential(&self, id: i32) -> Result<Option<Principal>, AppError> {
        let sql = format!("SELECT {} FROM principals WHERE id = $1", PRINCIPAL_COLUMNS);
        Ok(sqlx::query_as::<_, Principal>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn set_refresh_credential(&self, id: i32, hash: Option<&str>) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE principals SET refresh_token_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Self::expect_row(result.rows_affected())
    }

    async fn replace_refresh_credential(
        &self,
        id: i32,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE principals SET refresh_token_hash = $3 \
             WHERE id = $1 AND refresh_token_hash = $2",
        )
        .bind(id)
        .bind(expected_hash)
        .bind(new_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_reset_credential(
        &self,
        id: i32,
        hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE principals SET reset_token_hash = $2, reset_token_expires_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Self::expect_row(result.rows_affected())
    }

    async fn clear_reset_credential(&self, id: i32) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE principals SET reset_token_hash = NULL, reset_token_expires_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::expect_row(result.rows_affected())
    }

    async fn find_by_reset_credential(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        let sql = format!(
            "SELECT {} FROM principals WHERE reset_token_hash = $1",
            PRINCIPAL_COLUMNS
        );
        Ok(sqlx::query_as::<_, Principal>(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn complete_password_reset(&self, id: i32, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE principals SET password_hash = $2, reset_token_hash = NULL, \
             reset_token_expires_at = NULL, refresh_token_hash = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Self::expect_row(result.rows_affected())
    }
}

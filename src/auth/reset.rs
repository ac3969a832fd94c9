//! Password reset: issuing a one-time reset credential and redeeming it.
//!
//! Redeeming a reset credential replaces the password and clears the refresh
//! credential, which ends every session that existed before the reset.

use chrono::{Duration, Utc};
use log::{info, warn};
use rand::RngCore;

use crate::auth::password::hash_password;
use crate::auth::token::hash_credential;
use crate::error::AppError;
use crate::mailer::Mailer;
use crate::store::CredentialStore;

/// Generates and mails a reset credential if `email` belongs to a principal.
///
/// Unknown emails are not an error, so callers can answer identically either way.
pub async fn request_password_reset(
    store: &dyn CredentialStore,
    mailer: &dyn Mailer,
    ttl: Duration,
    email: &str,
) -> Result<(), AppError> {
    let Some(principal) = store.find_by_email(email).await? else {
        info!("password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_reset_token();
    store
        .set_reset_credential(principal.id, &hash_credential(&token), Utc::now() + ttl)
        .await?;
    mailer.send_password_reset(&principal.email, &token).await?;
    info!("password reset credential issued for principal {}", principal.id);
    Ok(())
}

/// Redeems a reset credential. Returns the id of the principal whose password
/// changed.
pub async fn complete_password_reset(
    store: &dyn CredentialStore,
    token: &str,
    new_password: &str,
    bcrypt_cost: u32,
) -> Result<i32, AppError> {
    let invalid = || AppError::BadRequest("Invalid or expired reset token".into());

    let principal = store
        .find_by_reset_credential(&hash_credential(token))
        .await?
        .ok_or_else(invalid)?;

    if !principal.reset_credential_valid_at(Utc::now()) {
        warn!("expired reset credential presented for principal {}", principal.id);
        store.clear_reset_credential(principal.id).await?;
        return Err(invalid());
    }

    let password_hash = hash_password(new_password, bcrypt_cost)?;
    store
        .complete_password_reset(principal.id, &password_hash)
        .await?;
    info!("password reset for principal {}; sessions revoked", principal.id);
    Ok(principal.id)
}

/// 32 random bytes, hex encoded.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::models::NewPrincipal;
    use crate::store::MemoryCredentialStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), AppError> {
            self.sent.lock().push((email.to_string(), token.to_string()));
            Ok(())
        }
    }

    async fn store_with_session() -> (MemoryCredentialStore, i32) {
        let store = MemoryCredentialStore::new();
        let p = store
            .create_principal(NewPrincipal {
                email: "a@x.com".into(),
                username: "alice".into(),
                full_name: None,
                password_hash: hash_password("pw123456", 4).unwrap(),
            })
            .await
            .unwrap();
        store.set_refresh_credential(p.id, Some("live")).await.unwrap();
        (store, p.id)
    }

    #[actix_rt::test]
    async fn test_reset_replaces_password_and_revokes_session() {
        let (store, id) = store_with_session().await;
        let mailer = CapturingMailer::default();

        request_password_reset(&store, &mailer, Duration::minutes(60), "a@x.com")
            .await
            .unwrap();
        let (to, token) = mailer.sent.lock()[0].clone();
        assert_eq!(to, "a@x.com");
        assert_eq!(token.len(), 64);

        let stored = store.get_principal_with_credential(id).await.unwrap().unwrap();
        assert_eq!(stored.reset_token_hash, Some(hash_credential(&token)));

        assert_eq!(
            complete_password_reset(&store, &token, "newpass99", 4).await.unwrap(),
            id
        );
        let stored = store.get_principal_with_credential(id).await.unwrap().unwrap();
        assert!(verify_password("newpass99", &stored.password_hash).unwrap());
        assert!(stored.refresh_token_hash.is_none());
        assert!(stored.reset_token_hash.is_none());

        // One-time use.
        assert!(matches!(
            complete_password_reset(&store, &token, "again999", 4).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[actix_rt::test]
    async fn test_unknown_email_sends_nothing() {
        let (store, _) = store_with_session().await;
        let mailer = CapturingMailer::default();
        request_password_reset(&store, &mailer, Duration::minutes(60), "nobody@x.com")
            .await
            .unwrap();
        assert!(mailer.sent.lock().is_empty());
    }

    #[actix_rt::test]
    async fn test_expired_reset_token_is_cleared() {
        let (store, id) = store_with_session().await;
        store
            .set_reset_credential(id, &hash_credential("stale"), Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        assert!(matches!(
            complete_password_reset(&store, "stale", "newpass99", 4).await,
            Err(AppError::BadRequest(_))
        ));
        let stored = store.get_principal_with_credential(id).await.unwrap().unwrap();
        assert!(stored.reset_token_hash.is_none());
        // The session survives a failed reset.
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("live"));
    }
}

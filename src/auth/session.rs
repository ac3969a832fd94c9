//! Server side of the session lifecycle: establishing a session, rotating it
//! on refresh, and ending it.
//!
//! A refresh attempt walks through [`RefreshStage`]s in order and may stop at
//! any checkpoint with a [`RefreshRejection`]. Every rejection surfaces to the
//! caller as a 401; the distinct reasons exist for diagnostics.

use std::fmt;

use log::{debug, info, warn};

use crate::auth::token::{hash_credential, TokenIssuer, TokenPair};
use crate::error::AppError;
use crate::models::Principal;
use crate::store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStage {
    Received,
    SignatureChecked,
    CredentialLookup,
    HashCompared,
    Rotated,
    Responded,
}

/// Why a refresh attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    /// Missing token, bad signature, wrong type or expired.
    InvalidToken,
    /// The principal is gone or has no stored credential (logged out / reset).
    Revoked,
    /// The token verifies but is not the stored credential: it was superseded
    /// by a rotation or a newer login.
    Mismatch,
}

impl RefreshRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            RefreshRejection::InvalidToken => "invalid refresh token",
            RefreshRejection::Revoked => "refresh token revoked",
            RefreshRejection::Mismatch => "refresh token mismatch",
        }
    }

    /// The checkpoint at which this rejection is raised.
    pub fn stage(&self) -> RefreshStage {
        match self {
            RefreshRejection::InvalidToken => RefreshStage::SignatureChecked,
            RefreshRejection::Revoked => RefreshStage::CredentialLookup,
            RefreshRejection::Mismatch => RefreshStage::HashCompared,
        }
    }
}

impl fmt::Display for RefreshRejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl From<RefreshRejection> for AppError {
    fn from(rejection: RefreshRejection) -> AppError {
        AppError::Unauthorized(rejection.reason().to_string())
    }
}

/// Result of a successful rotation.
#[derive(Debug)]
pub struct RotatedSession {
    pub principal: Principal,
    pub tokens: TokenPair,
}

/// Mints a pair for an authenticated principal and makes its refresh token
/// the only valid one. Used by login and registration.
pub async fn establish_session(
    store: &dyn CredentialStore,
    issuer: &TokenIssuer,
    principal_id: i32,
) -> Result<TokenPair, AppError> {
    let tokens = issuer.issue_tokens(principal_id)?;
    store
        .set_refresh_credential(principal_id, Some(&hash_credential(&tokens.refresh_token)))
        .await?;
    info!("session established for principal {}", principal_id);
    Ok(tokens)
}

/// Exchanges a presented refresh token for a new pair.
///
/// The stored hash is replaced only if it still equals the one just verified,
/// so of two concurrent refreshes presenting the same token exactly one wins;
/// the other is rejected as a mismatch.
pub async fn rotate_session(
    store: &dyn CredentialStore,
    issuer: &TokenIssuer,
    presented: Option<&str>,
) -> Result<RotatedSession, AppError> {
    debug!("refresh: {:?}", RefreshStage::Received);
    let presented = presented.ok_or_else(|| reject(RefreshRejection::InvalidToken, None))?;

    let claims = issuer.verify_refresh(presented).map_err(|e| {
        debug!("refresh token failed verification: {}", e);
        reject(RefreshRejection::InvalidToken, None)
    })?;
    debug!("refresh: {:?} for principal {}", RefreshStage::SignatureChecked, claims.sub);

    let principal = store
        .get_principal_with_credential(claims.sub)
        .await?
        .ok_or_else(|| reject(RefreshRejection::Revoked, Some(claims.sub)))?;
    let stored_hash = principal
        .refresh_token_hash
        .clone()
        .ok_or_else(|| reject(RefreshRejection::Revoked, Some(claims.sub)))?;
    debug!("refresh: {:?} for principal {}", RefreshStage::CredentialLookup, claims.sub);

    if hash_credential(presented) != stored_hash {
        return Err(reject(RefreshRejection::Mismatch, Some(claims.sub)));
    }
    debug!("refresh: {:?} for principal {}", RefreshStage::HashCompared, claims.sub);

    let tokens = issuer.issue_tokens(principal.id)?;
    let replaced = store
        .replace_refresh_credential(
            principal.id,
            &stored_hash,
            &hash_credential(&tokens.refresh_token),
        )
        .await?;
    if !replaced {
        // Another refresh (or a login/logout) wrote in between.
        return Err(reject(RefreshRejection::Mismatch, Some(principal.id)));
    }
    debug!("refresh: {:?} for principal {}", RefreshStage::Rotated, principal.id);

    info!("session rotated for principal {}", principal.id);
    debug!("refresh: {:?} for principal {}", RefreshStage::Responded, principal.id);
    Ok(RotatedSession { principal, tokens })
}

/// Revokes the stored refresh credential.
pub async fn end_session(store: &dyn CredentialStore, principal_id: i32) -> Result<(), AppError> {
    store.set_refresh_credential(principal_id, None).await?;
    info!("session ended for principal {}", principal_id);
    Ok(())
}

/// Works out whose session a logout request should end.
///
/// A valid access token is enough. Failing that, a refresh token counts only
/// if it is the currently stored credential, so a superseded token cannot be
/// used to log out the session that replaced it. Never fails: anything that
/// goes wrong just means no identity is known.
pub async fn resolve_logout_principal(
    store: &dyn CredentialStore,
    issuer: &TokenIssuer,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> Option<i32> {
    if let Some(claims) = access_token.and_then(|t| issuer.verify_access(t).ok()) {
        return Some(claims.sub);
    }

    let token = refresh_token?;
    let claims = issuer.verify_refresh(token).ok()?;
    match store.get_principal_with_credential(claims.sub).await {
        Ok(Some(principal))
            if principal.refresh_token_hash.as_deref() == Some(hash_credential(token).as_str()) =>
        {
            Some(principal.id)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("logout lookup failed for principal {}: {}", claims.sub, e);
            None
        }
    }
}

fn reject(rejection: RefreshRejection, principal_id: Option<i32>) -> AppError {
    match principal_id {
        Some(id) => warn!(
            "refresh rejected at {:?} for principal {}: {}",
            rejection.stage(),
            id,
            rejection
        ),
        None => warn!("refresh rejected at {:?}: {}", rejection.stage(), rejection),
    }
    rejection.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::tests::settings;
    use crate::models::NewPrincipal;
    use crate::store::MemoryCredentialStore;
    use pretty_assertions::assert_eq;

    async fn setup() -> (MemoryCredentialStore, TokenIssuer, i32) {
        let store = MemoryCredentialStore::new();
        let principal = store
            .create_principal(NewPrincipal {
                email: "a@x.com".into(),
                username: "alice".into(),
                full_name: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        (store, TokenIssuer::new(&settings()), principal.id)
    }

    async fn stored_hash(store: &MemoryCredentialStore, id: i32) -> Option<String> {
        store
            .get_principal_with_credential(id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token_hash
    }

    fn reason(result: Result<RotatedSession, AppError>) -> String {
        match result {
            Err(AppError::Unauthorized(reason)) => reason,
            other => panic!("expected a 401, got {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_establish_stores_hash_of_new_refresh_token() {
        let (store, issuer, id) = setup().await;
        let tokens = establish_session(&store, &issuer, id).await.unwrap();
        assert_eq!(
            stored_hash(&store, id).await,
            Some(hash_credential(&tokens.refresh_token))
        );
    }

    #[actix_rt::test]
    async fn test_rotation_replaces_stored_hash() {
        let (store, issuer, id) = setup().await;
        let first = establish_session(&store, &issuer, id).await.unwrap();

        let rotated = rotate_session(&store, &issuer, Some(&first.refresh_token))
            .await
            .unwrap();
        assert_eq!(rotated.principal.id, id);
        assert_eq!(
            stored_hash(&store, id).await,
            Some(hash_credential(&rotated.tokens.refresh_token))
        );
    }

    #[actix_rt::test]
    async fn test_superseded_token_is_a_mismatch() {
        let (store, issuer, id) = setup().await;
        let first = establish_session(&store, &issuer, id).await.unwrap();
        rotate_session(&store, &issuer, Some(&first.refresh_token))
            .await
            .unwrap();

        // Signature still verifies; only the stored hash says no.
        assert!(issuer.verify_refresh(&first.refresh_token).is_ok());
        let result = rotate_session(&store, &issuer, Some(&first.refresh_token)).await;
        assert_eq!(reason(result), "refresh token mismatch");
    }

    #[actix_rt::test]
    async fn test_second_login_invalidates_first_client() {
        let (store, issuer, id) = setup().await;
        let first_client = establish_session(&store, &issuer, id).await.unwrap();
        let _second_client = establish_session(&store, &issuer, id).await.unwrap();

        let result = rotate_session(&store, &issuer, Some(&first_client.refresh_token)).await;
        assert_eq!(reason(result), "refresh token mismatch");
    }

    #[actix_rt::test]
    async fn test_rejections_by_checkpoint() {
        let (store, issuer, id) = setup().await;

        assert_eq!(
            reason(rotate_session(&store, &issuer, None).await),
            "invalid refresh token"
        );
        assert_eq!(
            reason(rotate_session(&store, &issuer, Some("garbage")).await),
            "invalid refresh token"
        );

        let pair = issuer.issue_tokens(id).unwrap();
        assert_eq!(
            reason(rotate_session(&store, &issuer, Some(&pair.access_token)).await),
            "invalid refresh token"
        );
        // Valid signature but nothing stored: the principal has no session.
        assert_eq!(
            reason(rotate_session(&store, &issuer, Some(&pair.refresh_token)).await),
            "refresh token revoked"
        );

        let orphan = issuer.issue_tokens(999).unwrap();
        assert_eq!(
            reason(rotate_session(&store, &issuer, Some(&orphan.refresh_token)).await),
            "refresh token revoked"
        );
    }

    #[actix_rt::test]
    async fn test_end_session_revokes() {
        let (store, issuer, id) = setup().await;
        let tokens = establish_session(&store, &issuer, id).await.unwrap();

        end_session(&store, id).await.unwrap();
        assert_eq!(stored_hash(&store, id).await, None);

        let result = rotate_session(&store, &issuer, Some(&tokens.refresh_token)).await;
        assert_eq!(reason(result), "refresh token revoked");
    }

    #[actix_rt::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let (store, issuer, id) = setup().await;
        let tokens = establish_session(&store, &issuer, id).await.unwrap();

        let (a, b) = futures::join!(
            rotate_session(&store, &issuer, Some(&tokens.refresh_token)),
            rotate_session(&store, &issuer, Some(&tokens.refresh_token)),
        );
        let winners: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(
            stored_hash(&store, id).await,
            Some(hash_credential(&winners[0].tokens.refresh_token))
        );
    }

    #[actix_rt::test]
    async fn test_logout_principal_resolution() {
        let (store, issuer, id) = setup().await;
        let old = establish_session(&store, &issuer, id).await.unwrap();
        let current = establish_session(&store, &issuer, id).await.unwrap();

        assert_eq!(
            resolve_logout_principal(&store, &issuer, Some(&old.access_token), None).await,
            Some(id)
        );
        assert_eq!(
            resolve_logout_principal(&store, &issuer, None, Some(&current.refresh_token)).await,
            Some(id)
        );
        assert_eq!(
            resolve_logout_principal(&store, &issuer, None, Some(&old.refresh_token)).await,
            None
        );
        assert_eq!(
            resolve_logout_principal(&store, &issuer, Some("junk"), None).await,
            None
        );
        assert_eq!(resolve_logout_principal(&store, &issuer, None, None).await, None);
    }
}

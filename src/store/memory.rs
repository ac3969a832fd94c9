use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::CredentialStore;
use crate::error::AppError;
use crate::models::{NewPrincipal, Principal};

/// In-process store used by the test suite and by the server when no
/// `DATABASE_URL` is configured. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i32,
    principals: HashMap<i32, Principal>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<F>(&self, id: i32, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut Principal),
    {
        let mut inner = self.inner.lock();
        let principal = inner
            .principals
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Principal not found".into()))?;
        f(principal);
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, AppError> {
        let mut inner = self.inner.lock();
        if inner.principals.values().any(|p| p.email == new.email) {
            return Err(AppError::Conflict("Email already registered".into()));
        }

        inner.next_id += 1;
        let principal = Principal {
            id: inner.next_id,
            email: new.email,
            username: new.username,
            full_name: new.full_name,
            password_hash: new.password_hash,
            refresh_token_hash: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: Utc::now(),
        };
        inner.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let inner = self.inner.lock();
        Ok(inner.principals.values().find(|p| p.email == email).cloned())
    }

    async fn get_principal_with_credential(&self, id: i32) -> Result<Option<Principal>, AppError> {
        Ok(self.inner.lock().principals.get(&id).cloned())
    }

    async fn set_refresh_credential(&self, id: i32, hash: Option<&str>) -> Result<(), AppError> {
        self.update(id, |p| p.refresh_token_hash = hash.map(str::to_owned))
    }

    async fn replace_refresh_credential(
        &self,
        id: i32,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock();
        match inner.principals.get_mut(&id) {
            Some(p) if p.refresh_token_hash.as_deref() == Some(expected_hash) => {
                p.refresh_token_hash = Some(new_hash.to_owned());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_reset_credential(
        &self,
        id: i32,
        hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.update(id, |p| {
            p.reset_token_hash = Some(hash.to_owned());
            p.reset_token_expires_at = Some(expires_at);
        })
    }

    async fn clear_reset_credential(&self, id: i32) -> Result<(), AppError> {
        self.update(id, |p| {
            p.reset_token_hash = None;
            p.reset_token_expires_at = None;
        })
    }

    async fn find_by_reset_credential(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        let inner = self.inner.lock();
        Ok(inner
            .principals
            .values()
            .find(|p| p.reset_token_hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn complete_password_reset(&self, id: i32, password_hash: &str) -> Result<(), AppError> {
        self.update(id, |p| {
            p.password_hash = password_hash.to_owned();
            p.reset_token_hash = None;
            p.reset_token_expires_at = None;
            p.refresh_token_hash = None;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_principal(email: &str) -> NewPrincipal {
        NewPrincipal {
            email: email.into(),
            username: "user".into(),
            full_name: None,
            password_hash: "hash".into(),
        }
    }

    #[actix_rt::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryCredentialStore::new();
        let first = store.create_principal(new_principal("a@x.com")).await.unwrap();
        assert_eq!(first.id, 1);
        assert!(first.refresh_token_hash.is_none());

        match store.create_principal(new_principal("a@x.com")).await {
            Err(AppError::Conflict(_)) => {}
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[actix_rt::test]
    async fn test_refresh_credential_is_last_write_wins() {
        let store = MemoryCredentialStore::new();
        let p = store.create_principal(new_principal("a@x.com")).await.unwrap();

        store.set_refresh_credential(p.id, Some("one")).await.unwrap();
        store.set_refresh_credential(p.id, Some("two")).await.unwrap();
        let stored = store.get_principal_with_credential(p.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("two"));

        store.set_refresh_credential(p.id, None).await.unwrap();
        let stored = store.get_principal_with_credential(p.id).await.unwrap().unwrap();
        assert!(!stored.has_active_session());
    }

    #[actix_rt::test]
    async fn test_replace_only_when_expected_hash_matches() {
        let store = MemoryCredentialStore::new();
        let p = store.create_principal(new_principal("a@x.com")).await.unwrap();
        store.set_refresh_credential(p.id, Some("old")).await.unwrap();

        assert!(store.replace_refresh_credential(p.id, "old", "new-1").await.unwrap());
        // A second rotation that verified the same old hash loses.
        assert!(!store.replace_refresh_credential(p.id, "old", "new-2").await.unwrap());

        let stored = store.get_principal_with_credential(p.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token_hash.as_deref(), Some("new-1"));

        assert!(!store.replace_refresh_credential(999, "old", "new").await.unwrap());
    }

    #[actix_rt::test]
    async fn test_complete_password_reset_clears_credentials() {
        let store = MemoryCredentialStore::new();
        let p = store.create_principal(new_principal("a@x.com")).await.unwrap();
        store.set_refresh_credential(p.id, Some("session")).await.unwrap();
        store
            .set_reset_credential(p.id, "reset", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let found = store.find_by_reset_credential("reset").await.unwrap().unwrap();
        assert_eq!(found.id, p.id);

        store.complete_password_reset(p.id, "new-hash").await.unwrap();
        let stored = store.get_principal_with_credential(p.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
        assert!(stored.refresh_token_hash.is_none());
        assert!(stored.reset_token_hash.is_none());
        assert!(store.find_by_reset_credential("reset").await.unwrap().is_none());
    }

    #[actix_rt::test]
    async fn test_writes_to_unknown_principal_fail() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(
            store.set_refresh_credential(42, Some("x")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(store.get_principal_with_credential(42).await.unwrap().is_none());
    }
}

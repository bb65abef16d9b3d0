//! Per-user OAuth token storage.
//!
//! The store is created once at startup and shared by every request handler.
//! Entries for different users never interfere; there is no ordering between
//! users.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use yt_oauth::{OAuthError, OAuthToken};

const MAX_USER_ID_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid user id")]
    InvalidUserId,

    #[error(transparent)]
    Token(#[from] OAuthError),

    #[error("Failed to access credential store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// User ids are opaque, but they double as file names in the file store
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<OAuthToken>, StoreError>;

    async fn set(&self, user_id: &str, token: OAuthToken) -> Result<(), StoreError>;

    /// Returns whether a token was removed
    async fn delete(&self, user_id: &str) -> Result<bool, StoreError>;
}

/// Tokens kept in process memory, lost on restart
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<String, OAuthToken>>,
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, user_id: &str) -> Result<Option<OAuthToken>, StoreError> {
        Ok(self.tokens.read().await.get(user_id).cloned())
    }

    async fn set(&self, user_id: &str, token: OAuthToken) -> Result<(), StoreError> {
        if !is_valid_user_id(user_id) {
            return Err(StoreError::InvalidUserId);
        }
        self.tokens.write().await.insert(user_id.to_string(), token);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.tokens.write().await.remove(user_id).is_some())
    }
}

/// One `<user_id>.json` file per user inside a directory
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, user_id: &str) -> Option<PathBuf> {
        is_valid_user_id(user_id).then(|| self.dir.join(format!("{}.json", user_id)))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, user_id: &str) -> Result<Option<OAuthToken>, StoreError> {
        let Some(path) = self.path_for(user_id) else {
            return Ok(None);
        };

        let token = tokio::task::spawn_blocking(move || {
            if path.exists() {
                OAuthToken::load_from_file(&path).map(Some)
            } else {
                Ok(None)
            }
        })
        .await??;

        Ok(token)
    }

    async fn set(&self, user_id: &str, token: OAuthToken) -> Result<(), StoreError> {
        let path = self.path_for(user_id).ok_or(StoreError::InvalidUserId)?;
        tokio::task::spawn_blocking(move || token.save_to_file(&path)).await??;
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        let Some(path) = self.path_for(user_id) else {
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn token(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: access.to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: u64::MAX / 2,
            scope: None,
        }
    }

    #[test]
    fn user_id_validation() {
        assert!(is_valid_user_id("k3j2h4g5f6d7s"));
        assert!(is_valid_user_id("user_1-a"));
        assert!(!is_valid_user_id(""));
        assert!(!is_valid_user_id("../../etc/passwd"));
        assert!(!is_valid_user_id("a/b"));
        assert!(!is_valid_user_id(&"x".repeat(65)));
    }

    #[tokio::test]
    async fn memory_store_get_set_delete() {
        let store = MemoryCredentialStore::default();

        assert_eq!(store.get("alice").await.unwrap(), None);
        store.set("alice", token("a1")).await.unwrap();
        assert_eq!(store.get("alice").await.unwrap(), Some(token("a1")));

        store.set("alice", token("a2")).await.unwrap();
        assert_eq!(store.get("alice").await.unwrap(), Some(token("a2")));

        assert!(store.delete("alice").await.unwrap());
        assert!(!store.delete("alice").await.unwrap());
        assert_eq!(store.get("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_rejects_invalid_ids() {
        let store = MemoryCredentialStore::default();
        assert!(matches!(
            store.set("no spaces", token("x")).await,
            Err(StoreError::InvalidUserId)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_users_do_not_interfere() {
        let store = Arc::new(MemoryCredentialStore::default());

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let user = format!("user{}", i);
                    store.set(&user, token(&format!("token{}", i))).await.unwrap();
                    store.get(&user).await.unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let stored = handle.await.unwrap().unwrap();
            assert_eq!(stored.access_token, format!("token{}", i));
        }
    }

    #[tokio::test]
    async fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileCredentialStore::open(dir.path().join("sessions")).unwrap();
        store.set("bob", token("b1")).await.unwrap();

        let reopened = FileCredentialStore::open(dir.path().join("sessions")).unwrap();
        assert_eq!(reopened.get("bob").await.unwrap(), Some(token("b1")));
        assert!(dir.path().join("sessions").join("bob.json").exists());

        assert!(reopened.delete("bob").await.unwrap());
        assert_eq!(store.get("bob").await.unwrap(), None);
        assert!(!store.delete("bob").await.unwrap());
    }

    #[tokio::test]
    async fn file_store_never_touches_paths_outside_its_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.set("../escape", token("x")).await,
            Err(StoreError::InvalidUserId)
        ));
        assert_eq!(store.get("../escape").await.unwrap(), None);
        assert!(!store.delete("../escape").await.unwrap());
    }
}

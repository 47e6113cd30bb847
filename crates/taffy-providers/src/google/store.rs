//! Session-scoped key/value store.
//!
//! The store carries the redirect grant's results across the process
//! boundary between `taffy callback` and the chat session. Each key is one
//! file in the session directory, written atomically with owner-only
//! permissions.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Key of the persisted access token.
pub const TOKEN_KEY: &str = "google_oauth_token";

/// Key of the one-shot error message left by the redirect handler.
pub const ERROR_KEY: &str = "oauth_error";

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// An access token obtained through the redirect grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    /// Absolute expiry in epoch milliseconds, fixed when the token is stored.
    pub expires_at: i64,
}

impl StoredToken {
    /// Computes the absolute expiry from a relative lifetime in seconds.
    pub fn from_expires_in(access_token: impl Into<String>, expires_in: i64, now_ms: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: now_ms.saturating_add(expires_in.saturating_mul(1000)),
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }
}

/// File-backed store scoped to one session directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Reads the raw value for `key`.
    pub fn get(&self, key: &str) -> ProviderResult<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::storage(format!("failed to read {}", key)).with_source(e)),
        }
    }

    /// Writes `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &str) -> ProviderResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ProviderError::storage("failed to create session directory").with_source(e)
        })?;

        let path = self.path(key);
        let temp_path = path.with_extension("tmp");

        fs::write(&temp_path, value)
            .map_err(|e| ProviderError::storage(format!("failed to write {}", key)).with_source(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &path).map_err(|e| {
            ProviderError::storage(format!("failed to rename {}", key)).with_source(e)
        })?;

        debug!(key, "stored session value");
        Ok(())
    }

    /// Deletes `key`. Missing keys are not an error.
    pub fn remove(&self, key: &str) -> ProviderResult<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(ProviderError::storage(format!("failed to remove {}", key)).with_source(e))
            }
        }
    }

    /// Reads and deletes `key` in one step.
    pub fn take(&self, key: &str) -> ProviderResult<Option<String>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.remove(key)?;
        }
        Ok(value)
    }

    /// Returns the persisted token, if any.
    pub fn token(&self) -> ProviderResult<Option<StoredToken>> {
        let Some(raw) = self.get(TOKEN_KEY)? else {
            return Ok(None);
        };
        let token = serde_json::from_str(&raw).map_err(|e| {
            ProviderError::storage("stored token is not valid JSON").with_source(e)
        })?;
        Ok(Some(token))
    }

    pub fn set_token(&self, token: &StoredToken) -> ProviderResult<()> {
        let json = serde_json::to_string(token)
            .map_err(|e| ProviderError::internal("failed to serialize token").with_source(e))?;
        self.set(TOKEN_KEY, &json)?;
        info!(path = ?self.path(TOKEN_KEY), "persisted access token");
        Ok(())
    }

    pub fn clear_token(&self) -> ProviderResult<()> {
        self.remove(TOKEN_KEY)
    }

    /// Leaves a message for the next session to show once.
    pub fn set_error(&self, message: &str) -> ProviderResult<()> {
        self.set(ERROR_KEY, message)
    }

    /// Returns the pending error message and clears it.
    pub fn take_error(&self) -> ProviderResult<Option<String>> {
        self.take(ERROR_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session"));
        (dir, store)
    }

    #[test]
    fn expiry_is_computed_once_from_seconds() {
        let token = StoredToken::from_expires_in("abc", 3600, 1_000);
        assert_eq!(token.expires_at, 3_601_000);
        assert!(!token.is_expired(3_600_999));
        assert!(token.is_expired(3_601_000));
    }

    #[test]
    fn missing_keys_read_as_none() {
        let (_dir, store) = store();
        assert_eq!(store.get("anything").unwrap(), None);
        assert_eq!(store.token().unwrap(), None);
        assert_eq!(store.take_error().unwrap(), None);
        store.remove("anything").unwrap();
    }

    #[test]
    fn token_round_trips_as_json() {
        let (_dir, store) = store();
        let token = StoredToken::from_expires_in("abc123", 3600, 0);
        store.set_token(&token).unwrap();

        let raw = store.get(TOKEN_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["access_token"], "abc123");
        assert_eq!(value["expires_at"], 3_600_000);

        assert_eq!(store.token().unwrap(), Some(token));
        store.clear_token().unwrap();
        assert_eq!(store.token().unwrap(), None);
    }

    #[test]
    fn error_slot_is_read_once() {
        let (_dir, store) = store();
        store.set_error("Google Sign-In Error: access_denied").unwrap();
        assert_eq!(
            store.take_error().unwrap().as_deref(),
            Some("Google Sign-In Error: access_denied")
        );
        assert_eq!(store.take_error().unwrap(), None);
    }

    #[test]
    fn malformed_token_is_a_storage_error() {
        let (_dir, store) = store();
        store.set(TOKEN_KEY, "{not json").unwrap();
        let err = store.token().unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::StorageError);
    }

    #[cfg(unix)]
    #[test]
    fn values_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.set_error("x").unwrap();
        let mode = fs::metadata(store.dir().join(ERROR_KEY))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

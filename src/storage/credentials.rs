//! Credential Store
//!
//! Persists the session's tokens and cached profile under fixed keys.

use std::sync::Arc;
use tracing::{debug, warn};

use super::{InMemoryKeyValueStorage, KeyValueStorage};
use crate::error::{SessionResult, StorageError};
use crate::types::{Session, UserProfile};

/// Key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "token";
/// Key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Key holding the JSON-serialized profile.
pub const USER_KEY: &str = "user";
/// Key holding the profile id, kept in step with `user`.
pub const USER_ID_KEY: &str = "userId";

/// Durable store for the session. Reads go straight to the backend, so a
/// write is visible to the next read.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl CredentialStore {
    /// Create a store over any backend.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Create a store over process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKeyValueStorage::new()))
    }

    /// Write every present field and delete every absent one.
    pub fn save(&self, session: &Session) -> SessionResult<()> {
        self.write_optional(ACCESS_TOKEN_KEY, session.access_token.as_deref())?;
        self.write_optional(REFRESH_TOKEN_KEY, session.refresh_token.as_deref())?;

        match &session.user {
            Some(user) => {
                let payload =
                    serde_json::to_string(user).map_err(|e| StorageError::SerializationFailed {
                        message: e.to_string(),
                    })?;
                self.storage.set(USER_KEY, &payload)?;
                self.storage.set(USER_ID_KEY, &user.id)?;
            }
            None => {
                self.storage.remove(USER_KEY)?;
                self.storage.remove(USER_ID_KEY)?;
            }
        }

        debug!(
            has_access_token = session.access_token.is_some(),
            has_refresh_token = session.refresh_token.is_some(),
            has_user = session.user.is_some(),
            "Saved session credentials"
        );
        Ok(())
    }

    /// Best-effort reconstruction of the stored session. Never fails: read
    /// errors count as absence and a corrupt profile entry is removed.
    pub fn load(&self) -> Session {
        Session {
            access_token: self.read(ACCESS_TOKEN_KEY),
            refresh_token: self.read(REFRESH_TOKEN_KEY),
            user: self.load_user(),
        }
    }

    /// Delete all four keys.
    pub fn clear(&self) -> SessionResult<()> {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY, USER_ID_KEY] {
            self.storage.remove(key)?;
        }
        debug!("Cleared session credentials");
        Ok(())
    }

    /// Stored `userId`, if any.
    pub fn user_id(&self) -> Option<String> {
        self.read(USER_ID_KEY)
    }

    fn write_optional(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(v) => self.storage.set(key, v),
            None => self.storage.remove(key),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored credential");
                None
            }
        }
    }

    fn load_user(&self) -> Option<UserProfile> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str::<UserProfile>(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Discarding corrupt stored user profile");
                for key in [USER_KEY, USER_ID_KEY] {
                    if let Err(e) = self.storage.remove(key) {
                        warn!(key, error = %e, "Failed to remove corrupt entry");
                    }
                }
                None
            }
        }
    }
}

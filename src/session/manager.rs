//! Session Manager
//!
//! Owns the session state, the credential store and the rate limiter.
//! One instance per process, shared through `Arc`.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::SessionStateMachine;
use crate::error::{SessionError, SessionResult};
use crate::resilience::{RateDecision, RateLimiter};
use crate::storage::{CredentialStore, FileKeyValueStorage, InMemoryKeyValueStorage};
use crate::types::{OperationKind, ProfilePatch, Session, SessionConfig, SessionStatus, UserProfile};

/// Session context. State changes and their persistence happen under one
/// lock, so a reader never sees state that disagrees with storage.
pub struct SessionManager {
    state: Mutex<SessionStateMachine>,
    store: CredentialStore,
    limiter: RateLimiter,
}

impl SessionManager {
    /// Create a manager over the given store and limiter.
    pub fn new(store: CredentialStore, limiter: RateLimiter) -> Self {
        Self {
            state: Mutex::new(SessionStateMachine::new()),
            store,
            limiter,
        }
    }

    /// Create a manager from configuration: file-backed when
    /// `storage_path` is set, in memory otherwise.
    pub fn from_config(config: &SessionConfig) -> Self {
        let store = match &config.storage_path {
            Some(path) => CredentialStore::new(Arc::new(FileKeyValueStorage::open(path))),
            None => CredentialStore::new(Arc::new(InMemoryKeyValueStorage::new())),
        };
        Self::new(store, RateLimiter::new(config.rate_limits.clone()))
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().is_authenticated()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.state.lock().session().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().session().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.lock().session().refresh_token.clone()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.lock().session().user.clone()
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Rate-limit admission for `kind`.
    pub fn admit(&self, kind: OperationKind) -> SessionResult<()> {
        match self.limiter.try_acquire(kind) {
            RateDecision::Allowed => Ok(()),
            RateDecision::Denied { message } => {
                Err(SessionError::ThrottledLocally { kind, message })
            }
        }
    }

    /// Clear the attempt count of `kind` after a successful request.
    pub fn record_success(&self, kind: OperationKind) {
        self.limiter.record_success(kind);
    }

    /// Mark an auth-determining request in flight until the guard drops.
    pub fn begin_pending(&self) -> PendingGuard<'_> {
        self.state.lock().begin();
        PendingGuard {
            manager: self,
            restoring: false,
        }
    }

    /// Load stored credentials for validation. Returns `None` when no
    /// access token was stored; otherwise the session stays `pending` while
    /// the returned guard lives. If the guard drops before the session
    /// settles as `authenticated`, the hydrated credentials are dropped from
    /// memory. Storage keeps them for the next start.
    pub fn restore(&self) -> Option<PendingGuard<'_>> {
        let stored = self.store.load();
        if !stored.has_access_token() {
            debug!("No stored credentials to restore");
            return None;
        }

        let mut state = self.state.lock();
        state.begin();
        state.hydrate(stored);
        debug!("Restored stored credentials, validation pending");
        Some(PendingGuard {
            manager: self,
            restoring: true,
        })
    }

    /// Adopt a session granted by the server and persist it.
    pub fn authenticate(&self, session: Session) -> SessionResult<()> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        next.authenticate(session)?;
        self.store.save(next.session())?;
        *state = next;
        info!(user_id = ?state.session().user_id(), "Session authenticated");
        Ok(())
    }

    /// Replace the profile of the current session, keeping its tokens.
    pub fn set_user(&self, user: UserProfile) -> SessionResult<()> {
        let mut state = self.state.lock();
        if !state.session().has_access_token() {
            return Err(SessionError::NoCredential {
                operation: OperationKind::GetUser.to_string(),
            });
        }
        let mut session = state.session().clone();
        session.user = Some(user);
        let mut next = state.clone();
        next.authenticate(session)?;
        self.store.save(next.session())?;
        *state = next;
        Ok(())
    }

    /// Apply a profile update. A profile returned by the server wins over
    /// the locally merged one.
    pub fn update_user(
        &self,
        patch: &ProfilePatch,
        server_user: Option<UserProfile>,
    ) -> SessionResult<UserProfile> {
        let mut state = self.state.lock();
        let current = state
            .session()
            .user
            .clone()
            .ok_or_else(|| SessionError::NoCredential {
                operation: OperationKind::UpdateProfile.to_string(),
            })?;

        let merged = server_user.unwrap_or_else(|| {
            let mut merged = current;
            merged.apply(patch);
            merged
        });

        let mut next = state.clone();
        next.set_user(merged.clone())?;
        self.store.save(next.session())?;
        *state = next;
        debug!(user_id = %merged.id, "Profile updated");
        Ok(merged)
    }

    /// Install refreshed tokens in place.
    pub fn replace_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> SessionResult<Session> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        next.replace_tokens(access_token, refresh_token)?;
        self.store.save(next.session())?;
        *state = next;
        debug!("Access token refreshed");
        Ok(state.session().clone())
    }

    /// Session rejected by the server: drop it everywhere.
    pub fn invalidate(&self) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.invalidate();
        warn!("Session invalidated by server");
        self.store.clear()
    }

    /// Invalidate only if `token` is still the held access token. A 401
    /// for a token already replaced by a newer sign-in is ignored.
    pub fn invalidate_token(&self, token: &str) -> SessionResult<bool> {
        let mut state = self.state.lock();
        if state.session().access_token.as_deref() != Some(token) {
            debug!("Ignoring rejection of a superseded access token");
            return Ok(false);
        }
        state.invalidate();
        warn!("Session invalidated by server");
        self.store.clear()?;
        Ok(true)
    }

    /// Explicit sign-out.
    pub fn logout(&self) -> SessionResult<()> {
        let mut state = self.state.lock();
        state.invalidate();
        info!("Session logged out");
        self.store.clear()
    }
}

/// Keeps the session `pending` until dropped, including when the request
/// future is dropped mid-flight.
pub struct PendingGuard<'a> {
    manager: &'a SessionManager,
    restoring: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.manager.state.lock();
        state.end();
        if self.restoring && state.discard_unsettled() {
            debug!("Restore abandoned before validation, dropping hydrated credentials");
        }
    }
}

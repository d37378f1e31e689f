//! Session State Machine
//!
//! `anonymous → pending → authenticated`, and back to `anonymous` on logout
//! or invalidation. `pending` is reported while any auth-determining
//! request is in flight; the settled status underneath it is only ever
//! `anonymous` or `authenticated`.

use crate::error::{ProtocolError, SessionError, SessionResult};
use crate::types::{Session, SessionStatus, UserProfile};

/// In-memory session and its status.
#[derive(Clone, Debug, Default)]
pub struct SessionStateMachine {
    settled: SessionStatus,
    in_flight: u32,
    session: Session,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        if self.in_flight > 0 {
            SessionStatus::Pending
        } else {
            self.settled
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// An auth-determining request started.
    pub fn begin(&mut self) {
        self.in_flight += 1;
    }

    /// An auth-determining request finished, whatever its outcome.
    pub fn end(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Load stored credentials for validation. Must be called between
    /// `begin` and `end` so the tokens are never held while `anonymous`.
    pub fn hydrate(&mut self, session: Session) {
        debug_assert!(self.in_flight > 0, "hydrate outside of a pending request");
        self.session = session;
    }

    /// Drop hydrated credentials that were never confirmed. Keeps the
    /// session when it settled as `authenticated` meanwhile. Returns
    /// whether anything was dropped.
    pub fn discard_unsettled(&mut self) -> bool {
        if self.settled == SessionStatus::Authenticated || self.session.is_empty() {
            return false;
        }
        self.session = Session::default();
        true
    }

    /// Adopt a session granted by the server.
    pub fn authenticate(&mut self, session: Session) -> SessionResult<()> {
        if session.access_token.is_none() {
            return Err(ProtocolError::MissingField {
                field: "accessToken".to_string(),
            }
            .into());
        }
        self.session = session;
        self.settled = SessionStatus::Authenticated;
        Ok(())
    }

    /// Drop everything held and return to `anonymous`.
    pub fn invalidate(&mut self) {
        self.session = Session::default();
        self.settled = SessionStatus::Anonymous;
    }

    /// Replace tokens in place after a refresh. A missing refresh token in
    /// the response keeps the previous one.
    pub fn replace_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> SessionResult<()> {
        if self.settled != SessionStatus::Authenticated {
            return Err(SessionError::NoCredential {
                operation: "refreshToken".to_string(),
            });
        }
        self.session.access_token = Some(access_token);
        if refresh_token.is_some() {
            self.session.refresh_token = refresh_token;
        }
        Ok(())
    }

    /// Replace the cached profile of an authenticated session.
    pub fn set_user(&mut self, user: UserProfile) -> SessionResult<()> {
        if self.settled != SessionStatus::Authenticated {
            return Err(SessionError::NoCredential {
                operation: "updateProfile".to_string(),
            });
        }
        self.session.user = Some(user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn user() -> UserProfile {
        UserProfile {
            id: "1".to_string(),
            name: "Kim".to_string(),
            email: "kim@example.com".to_string(),
            role: Role::Student,
            avatar_url: None,
            description: None,
        }
    }

    #[test]
    fn test_login_lifecycle() {
        let mut machine = SessionStateMachine::new();
        assert_eq!(machine.status(), SessionStatus::Anonymous);

        machine.begin();
        assert_eq!(machine.status(), SessionStatus::Pending);

        machine
            .authenticate(Session::new().with_access_token("abc").with_user(user()))
            .unwrap();
        machine.end();
        assert_eq!(machine.status(), SessionStatus::Authenticated);

        machine.invalidate();
        assert_eq!(machine.status(), SessionStatus::Anonymous);
        assert!(machine.session().is_empty());
    }

    #[test]
    fn test_failed_request_keeps_previous_status() {
        let mut machine = SessionStateMachine::new();
        machine
            .authenticate(Session::new().with_access_token("abc"))
            .unwrap();

        machine.begin();
        machine.end();

        assert_eq!(machine.status(), SessionStatus::Authenticated);
        assert_eq!(machine.session().access_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_authenticate_requires_token() {
        let mut machine = SessionStateMachine::new();
        let result = machine.authenticate(Session::new().with_user(user()));

        assert!(result.is_err());
        assert_eq!(machine.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_overlapping_requests_stay_pending() {
        let mut machine = SessionStateMachine::new();
        machine.begin();
        machine.begin();
        machine.end();
        assert_eq!(machine.status(), SessionStatus::Pending);
        machine.end();
        assert_eq!(machine.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_discard_unsettled_drops_hydrated_tokens() {
        let mut machine = SessionStateMachine::new();
        machine.begin();
        machine.hydrate(Session::new().with_access_token("stored"));
        machine.end();
        assert!(machine.discard_unsettled());

        assert_eq!(machine.status(), SessionStatus::Anonymous);
        assert!(machine.session().is_empty());

        machine
            .authenticate(Session::new().with_access_token("abc"))
            .unwrap();
        assert!(!machine.discard_unsettled());
        assert_eq!(machine.session().access_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_replace_tokens_keeps_refresh_when_omitted() {
        let mut machine = SessionStateMachine::new();
        assert!(machine.replace_tokens("x".to_string(), None).is_err());

        machine
            .authenticate(
                Session::new()
                    .with_access_token("old")
                    .with_refresh_token("r1")
                    .with_user(user()),
            )
            .unwrap();
        machine.replace_tokens("new".to_string(), None).unwrap();

        let session = machine.session();
        assert_eq!(session.access_token.as_deref(), Some("new"));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert!(session.user.is_some());
    }
}

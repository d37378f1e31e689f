//! Configuration Types
//!
//! Settings for the API connection, rate limits, retry and persistence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use super::OperationKind;
use crate::resilience::RetryPolicy;

/// Length of a rate-limit window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Paths of the auth endpoints, relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    pub register: String,
    pub verify_code: String,
    pub login: String,
    pub logout: String,
    pub current_user: String,
    pub forgot_password: String,
    pub reset_password: String,
    pub update_password: String,
    pub resend_verification_code: String,
    pub refresh_token: String,
    pub update_profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            register: "/auth/register".to_string(),
            verify_code: "/auth/verify-code".to_string(),
            login: "/auth/login".to_string(),
            logout: "/auth/logout".to_string(),
            current_user: "/auth/me".to_string(),
            forgot_password: "/auth/forgot-password".to_string(),
            reset_password: "/auth/reset-password".to_string(),
            update_password: "/auth/update-password".to_string(),
            resend_verification_code: "/auth/resend-verification-code".to_string(),
            refresh_token: "/auth/refresh-token".to_string(),
            update_profile: "/auth/update-profile".to_string(),
        }
    }
}

impl Endpoints {
    /// Path for an operation.
    pub fn path(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::Register => &self.register,
            OperationKind::VerifyCode => &self.verify_code,
            OperationKind::Login => &self.login,
            OperationKind::Logout => &self.logout,
            OperationKind::GetUser => &self.current_user,
            OperationKind::ForgotPassword => &self.forgot_password,
            OperationKind::ResetPassword => &self.reset_password,
            OperationKind::UpdatePassword => &self.update_password,
            OperationKind::ResendVerificationCode => &self.resend_verification_code,
            OperationKind::RefreshToken => &self.refresh_token,
            OperationKind::UpdateProfile => &self.update_profile,
        }
    }
}

/// Attempts allowed per window, per operation kind. Kinds without an
/// entry are never throttled locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub limits: HashMap<OperationKind, u32>,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        let limits = [
            (OperationKind::Login, 10),
            (OperationKind::GetUser, 20),
            (OperationKind::ForgotPassword, 5),
            (OperationKind::ResendVerificationCode, 5),
        ]
        .into_iter()
        .collect();

        Self {
            window: DEFAULT_RATE_WINDOW,
            limits,
        }
    }
}

impl RateLimitPolicy {
    /// Policy with no limits at all.
    pub fn unlimited() -> Self {
        Self {
            window: DEFAULT_RATE_WINDOW,
            limits: HashMap::new(),
        }
    }

    /// Set the limit for one kind.
    pub fn with_limit(mut self, kind: OperationKind, limit: u32) -> Self {
        self.limits.insert(kind, limit);
        self
    }

    /// Set the window length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn limit_for(&self, kind: OperationKind) -> Option<u32> {
        self.limits.get(&kind).copied()
    }
}

/// Complete configuration of the session layer.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// API root, e.g. `https://api.edupulse.app/api/v1/`.
    pub base_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
    pub endpoints: Endpoints,
    pub rate_limits: RateLimitPolicy,
    pub retry: RetryPolicy,
    /// File backing the credential store; in-memory when unset.
    pub storage_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Absolute URL of an operation's endpoint.
    pub fn endpoint_url(&self, kind: OperationKind) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = self.endpoints.path(kind).trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

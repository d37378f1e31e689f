//! Configuration Builder
//!
//! Fluent builder for the session configuration.

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigurationError, SessionError};
use crate::resilience::RetryPolicy;
use crate::types::{Endpoints, OperationKind, RateLimitPolicy, SessionConfig, DEFAULT_TIMEOUT};

/// Base URL of the API.
pub const ENV_BASE_URL: &str = "EDUPULSE_API_BASE_URL";
/// Per-request timeout in seconds.
pub const ENV_TIMEOUT_SECS: &str = "EDUPULSE_TIMEOUT_SECS";
/// Retries on server throttling.
pub const ENV_MAX_RETRIES: &str = "EDUPULSE_MAX_RETRIES";
/// First backoff delay in milliseconds.
pub const ENV_RETRY_BASE_DELAY_MS: &str = "EDUPULSE_RETRY_BASE_DELAY_MS";
/// File persisting the session across restarts.
pub const ENV_SESSION_FILE: &str = "EDUPULSE_SESSION_FILE";

/// Session configuration builder.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    base_url: Option<String>,
    timeout: Duration,
    endpoints: Endpoints,
    rate_limits: RateLimitPolicy,
    retry: RetryPolicy,
    storage_path: Option<PathBuf>,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            endpoints: Endpoints::default(),
            rate_limits: RateLimitPolicy::default(),
            retry: RetryPolicy::default(),
            storage_path: None,
        }
    }

    /// Start from environment variables. Unset or unparseable values keep
    /// their defaults; the base URL is still validated by `build`.
    pub fn from_env() -> Self {
        let mut builder = Self::new();

        if let Ok(url) = std::env::var(ENV_BASE_URL) {
            builder.base_url = Some(url);
        }
        if let Some(secs) = env_parse::<u64>(ENV_TIMEOUT_SECS) {
            builder.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>(ENV_MAX_RETRIES) {
            builder.retry.max_retries = retries;
        }
        if let Some(ms) = env_parse::<u64>(ENV_RETRY_BASE_DELAY_MS) {
            builder.retry.base_delay = Duration::from_millis(ms);
        }
        if let Ok(path) = std::env::var(ENV_SESSION_FILE) {
            builder.storage_path = Some(PathBuf::from(path));
        }

        builder
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override endpoint paths.
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replace the whole rate-limit policy.
    pub fn rate_limits(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limits = policy;
        self
    }

    /// Set the per-window limit of one operation kind.
    pub fn rate_limit(mut self, kind: OperationKind, limit: u32) -> Self {
        self.rate_limits = self.rate_limits.with_limit(kind, limit);
        self
    }

    /// Replace the whole retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    pub fn max_jitter(mut self, jitter: Duration) -> Self {
        self.retry.max_jitter = jitter;
        self
    }

    /// Persist the session to this file.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Build the session configuration.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let raw = self.base_url.ok_or_else(|| ConfigurationError::MissingRequired {
            field: "base_url".to_string(),
        })?;

        let base_url = Url::parse(&raw).map_err(|_| ConfigurationError::InvalidBaseUrl {
            url: raw.clone(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigurationError::InvalidBaseUrl { url: raw }.into());
        }

        if self.retry.base_delay.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "retry base delay must be greater than zero".to_string(),
            }
            .into());
        }

        if self.rate_limits.window.is_zero() {
            return Err(ConfigurationError::InvalidConfig {
                message: "rate limit window must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(SessionConfig {
            base_url,
            timeout: self.timeout,
            endpoints: self.endpoints,
            rate_limits: self.rate_limits,
            retry: self.retry,
            storage_path: self.storage_path,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Create a new session configuration builder.
pub fn session_config() -> SessionConfigBuilder {
    SessionConfigBuilder::new()
}

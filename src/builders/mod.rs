//! Builders
//!
//! Fluent builder for the session configuration.

pub mod config;

pub use config::{
    session_config, SessionConfigBuilder, ENV_BASE_URL, ENV_MAX_RETRIES,
    ENV_RETRY_BASE_DELAY_MS, ENV_SESSION_FILE, ENV_TIMEOUT_SECS,
};

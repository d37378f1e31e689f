//! EduPulse Session Layer
//!
//! Authenticated-session lifecycle and request resilience for the EduPulse
//! learning platform API.
//!
//! # Features
//!
//! - Credential persistence across restarts (`token`, `refreshToken`, `user`, `userId`)
//! - Per-operation sliding-window rate limiting, checked before any request
//! - Exponential backoff with jitter when the server answers 429
//! - Session invalidation when a credentialed request is rejected with 401
//! - Single-flight token refresh
//!
//! # Example
//!
//! ```rust,ignore
//! use edupulse_session::{session_config, AuthClient, LoginRequest, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = session_config()
//!         .base_url("https://api.edupulse.app/api/v1")
//!         .storage_path("session.json")
//!         .build()?;
//!
//!     let client = AuthClient::new(config)?;
//!     client.initialize().await?;
//!
//!     let session = client
//!         .login(LoginRequest::new("noor@example.com", "secret"), RequestOptions::default())
//!         .await?;
//!     println!("Signed in as {:?}", session.user.map(|u| u.name));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: session, profile, payload and configuration types
//! - `error`: error hierarchy and response classification
//! - `core`: HTTP transport
//! - `storage`: key-value backends and the credential store
//! - `resilience`: rate limiter and backoff retrier
//! - `session`: session state machine and its owning manager
//! - `builders`: fluent configuration builder
//! - `client`: high-level client running every auth operation

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod resilience;
pub mod session;
pub mod storage;
pub mod types;

// Re-export main client
pub use client::{auth_client, AuthClient, RequestOptions};

// Re-export builders
pub use builders::{session_config, SessionConfigBuilder};

// Re-export errors
pub use error::{get_user_message, SessionError, SessionResult};

// Re-export session
pub use session::{SessionManager, SessionStateMachine};

// Re-export storage
pub use storage::{CredentialStore, FileKeyValueStorage, InMemoryKeyValueStorage, KeyValueStorage};

// Re-export resilience
pub use resilience::{BackoffRetrier, RateDecision, RateLimiter, RetryPolicy};

// Re-export transport
pub use crate::core::{HttpTransport, MockHttpTransport, ReqwestHttpTransport};

// Re-export types
pub use types::{
    Endpoints, ForgotPasswordRequest, LoginRequest, MessageResponse, OperationKind,
    ProfilePatch, RateLimitPolicy, RegisterRequest, ResendCodeRequest, ResetPasswordRequest,
    Role, Session, SessionConfig, SessionStatus, UpdatePasswordRequest, UserProfile,
    VerifyCodeRequest,
};

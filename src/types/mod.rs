//! Session Types
//!
//! Data structures shared across the session layer.

pub mod config;
pub mod operation;
pub mod payloads;
pub mod session;
pub mod user;

pub use config::{
    Endpoints, RateLimitPolicy, SessionConfig, DEFAULT_RATE_WINDOW, DEFAULT_TIMEOUT,
};
pub use operation::OperationKind;
pub use payloads::{
    extract_user, unwrap_envelope, AuthPayload, ForgotPasswordRequest, LoginRequest,
    MessageResponse, RegisterRequest, ResendCodeRequest, ResetPasswordRequest,
    UpdatePasswordRequest, VerifyCodeRequest,
};
pub use session::{Session, SessionStatus};
pub use user::{ProfilePatch, Role, UserProfile};

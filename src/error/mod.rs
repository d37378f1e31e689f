//! Session Error Types
//!
//! Error hierarchy for the session and request resilience layer.

use std::time::Duration;
use thiserror::Error;

use crate::types::OperationKind;

/// Fallback shown when a response body carries no usable message.
const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Root error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Local rate limiter denied the attempt; no request was sent.
    #[error("{message}")]
    ThrottledLocally {
        kind: OperationKind,
        message: String,
    },

    /// Server kept answering 429 after all retries were spent.
    #[error("{message}")]
    ThrottledRemotely {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Server rejected the credential on an authenticated request.
    #[error("Session expired: {message}")]
    Unauthorized { message: String },

    /// A credentialed operation was attempted without a stored token.
    #[error("No credential available for {operation}")]
    NoCredential { operation: String },

    /// Request was cancelled or marked silent; nothing to report.
    #[error("Request cancelled")]
    Cancelled,

    /// Any other HTTP failure returned by the API.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Get error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ThrottledLocally { .. } => "SESSION_THROTTLED_LOCAL",
            Self::ThrottledRemotely { .. } => "SESSION_THROTTLED_REMOTE",
            Self::Unauthorized { .. } => "SESSION_UNAUTHORIZED",
            Self::NoCredential { .. } => "SESSION_NO_CREDENTIAL",
            Self::Cancelled => "SESSION_CANCELLED",
            Self::Api { .. } => "SESSION_API",
            Self::Network(_) => "SESSION_NETWORK",
            Self::Protocol(_) => "SESSION_PROTOCOL",
            Self::Configuration(_) => "SESSION_CONFIG",
            Self::Storage(_) => "SESSION_STORAGE",
        }
    }

    /// True only for the server's "slow down" signal. This is the sole
    /// condition under which a request is retried.
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::ThrottledRemotely { .. })
    }

    /// True when the session must be invalidated.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// True for cancelled or silent requests.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Get retry-after duration if the server supplied one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ThrottledRemotely { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        get_user_message(self)
    }

    /// HTTP status behind the error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ThrottledRemotely { .. } => Some(429),
            Self::Unauthorized { .. } => Some(401),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid base URL: {url}")]
    InvalidBaseUrl { url: String },
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Failed to build HTTP client: {message}")]
    ClientBuild { message: String },
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },
}

/// Storage error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Serialization failed: {message}")]
    SerializationFailed { message: String },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Error body shapes returned by the API.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

impl ApiErrorBody {
    /// First usable message, in `message`, `error`, `errors[0]` order.
    pub fn best_message(&self) -> Option<String> {
        if let Some(message) = non_empty(self.message.as_deref()) {
            return Some(message);
        }
        if let Some(error) = non_empty(self.error.as_deref()) {
            return Some(error);
        }
        self.errors.first().and_then(|first| match first {
            serde_json::Value::String(s) => non_empty(Some(s.as_str())),
            serde_json::Value::Object(map) => {
                non_empty(map.get("message").and_then(|m| m.as_str()))
            }
            _ => None,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Parse error body, if it is JSON.
pub fn parse_error_body(body: &str) -> Option<ApiErrorBody> {
    serde_json::from_str(body).ok()
}

/// Extract a user-facing message from an error body.
pub fn extract_error_message(status: u16, body: &str) -> String {
    parse_error_body(body)
        .and_then(|parsed| parsed.best_message())
        .unwrap_or_else(|| match status {
            400 => "The request was invalid.".to_string(),
            401 => "Invalid credentials.".to_string(),
            403 => "You do not have permission to do that.".to_string(),
            404 => "The requested resource was not found.".to_string(),
            500..=599 => "The server encountered an error. Please try again later.".to_string(),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        })
}

/// Classify an HTTP error response.
///
/// `credentialed` marks requests that carried a bearer token: only there
/// does a 401 mean the session is gone. A 401 on login is a bad password.
pub fn create_error_from_response(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
    credentialed: bool,
) -> SessionError {
    match status {
        429 => SessionError::ThrottledRemotely {
            message: extract_error_message(status, body),
            retry_after,
        },
        401 if credentialed => SessionError::Unauthorized {
            message: extract_error_message(status, body),
        },
        _ => SessionError::Api {
            status,
            message: extract_error_message(status, body),
        },
    }
}

/// Get user-friendly error message.
pub fn get_user_message(error: &SessionError) -> String {
    match error {
        SessionError::ThrottledLocally { message, .. } => message.clone(),
        SessionError::ThrottledRemotely { .. } => {
            "The server is busy right now. Please wait a moment and try again.".to_string()
        }
        SessionError::Unauthorized { .. } => {
            "Your session has expired. Please sign in again.".to_string()
        }
        SessionError::NoCredential { .. } => "Please sign in to continue.".to_string(),
        SessionError::Cancelled => String::new(),
        SessionError::Api { message, .. } => message.clone(),
        SessionError::Network(NetworkError::Timeout { .. }) => {
            "The request timed out. Please check your connection and try again.".to_string()
        }
        SessionError::Network(_) => {
            "Unable to reach the server. Please check your connection.".to_string()
        }
        _ => GENERIC_ERROR_MESSAGE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_remote_throttling_is_retryable() {
        let throttled = SessionError::ThrottledRemotely {
            message: "slow down".to_string(),
            retry_after: None,
        };
        assert!(throttled.is_throttling());

        assert!(!SessionError::Unauthorized {
            message: "expired".to_string()
        }
        .is_throttling());
        assert!(!SessionError::Api {
            status: 503,
            message: "down".to_string()
        }
        .is_throttling());
        assert!(!SessionError::ThrottledLocally {
            kind: OperationKind::Login,
            message: "wait".to_string()
        }
        .is_throttling());
    }

    #[test]
    fn test_401_depends_on_credential() {
        let err = create_error_from_response(401, r#"{"message":"jwt expired"}"#, None, true);
        assert!(err.is_unauthorized());

        let err = create_error_from_response(401, r#"{"message":"Wrong password"}"#, None, false);
        match err {
            SessionError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Wrong password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_429_keeps_retry_after() {
        let err = create_error_from_response(429, "", Some(Duration::from_secs(3)), false);
        assert!(err.is_throttling());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(extract_error_message(400, r#"{"message":"Email taken"}"#), "Email taken");
        assert_eq!(extract_error_message(400, r#"{"error":"Bad OTP"}"#), "Bad OTP");
        assert_eq!(
            extract_error_message(422, r#"{"errors":[{"message":"Name required"}]}"#),
            "Name required"
        );
        assert_eq!(
            extract_error_message(422, r#"{"errors":["Password too short"]}"#),
            "Password too short"
        );
        assert_eq!(
            extract_error_message(500, "<html>oops</html>"),
            "The server encountered an error. Please try again later."
        );
        assert_eq!(extract_error_message(418, r#"{"message":"  "}"#), GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn test_user_message() {
        let err = SessionError::Unauthorized {
            message: "jwt expired".to_string(),
        };
        assert_eq!(
            get_user_message(&err),
            "Your session has expired. Please sign in again."
        );
        assert!(SessionError::Cancelled.user_message().is_empty());
    }
}

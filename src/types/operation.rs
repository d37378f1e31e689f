//! Operation Kinds
//!
//! Names for the API operations the session layer issues.

use std::fmt;

/// An API operation, used for rate limiting and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Register,
    VerifyCode,
    Login,
    Logout,
    GetUser,
    ForgotPassword,
    ResetPassword,
    UpdatePassword,
    ResendVerificationCode,
    RefreshToken,
    UpdateProfile,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::VerifyCode => "verifyCode",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::GetUser => "getUser",
            Self::ForgotPassword => "forgotPassword",
            Self::ResetPassword => "resetPassword",
            Self::UpdatePassword => "updatePassword",
            Self::ResendVerificationCode => "resendVerificationCode",
            Self::RefreshToken => "refreshToken",
            Self::UpdateProfile => "updateProfile",
        }
    }

    /// Message returned when the local rate limiter denies this operation.
    pub fn throttle_message(&self) -> String {
        match self {
            Self::Login => {
                "Too many login attempts. Please wait a minute before trying again.".to_string()
            }
            Self::GetUser => {
                "Too many profile requests. Please wait a moment before trying again.".to_string()
            }
            Self::ForgotPassword => {
                "Too many password reset requests. Please wait before trying again.".to_string()
            }
            Self::ResendVerificationCode => {
                "Too many verification code requests. Please wait before requesting another code."
                    .to_string()
            }
            other => format!(
                "Too many {} requests. Please wait before trying again.",
                other.as_str()
            ),
        }
    }

    /// Message shown once the server kept throttling this operation.
    pub fn server_busy_message(&self) -> String {
        match self {
            Self::Login => {
                "The server is receiving too many login requests. Please try again shortly."
                    .to_string()
            }
            _ => "The server is busy. Please try again shortly.".to_string(),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_api_names() {
        assert_eq!(OperationKind::GetUser.to_string(), "getUser");
        assert_eq!(
            OperationKind::ResendVerificationCode.to_string(),
            "resendVerificationCode"
        );
    }

    #[test]
    fn test_throttle_messages_are_kind_specific() {
        assert!(OperationKind::Login.throttle_message().contains("login"));
        assert!(OperationKind::GetUser.throttle_message().contains("profile"));
        assert_ne!(
            OperationKind::Login.throttle_message(),
            OperationKind::GetUser.throttle_message()
        );
    }
}

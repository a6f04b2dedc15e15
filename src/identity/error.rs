//! Closed error taxonomy for identity-provider operations.
//!
//! DESIGN
//! ======
//! Provider adapters classify raw failures here, at the call boundary. The
//! flow controller and its callers only ever see [`AuthError`], and its
//! `Display` is the message shown to the user. Raw provider identifiers and
//! messages belong in logs, never in these strings.

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

/// User-facing category of a failed identity-provider operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown identity or wrong secret.
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// The account exists but its email is not verified yet.
    #[error("Please verify your email address")]
    VerificationRequired,
    /// The provider requires a password reset before sign-in.
    #[error("Password reset required. Please use \"Forgot Password?\"")]
    ResetRequired,
    /// Throttled by the provider.
    #[error("Too many attempts. Please try again later")]
    RateLimited,
    /// Wrong password-reset code.
    #[error("Invalid verification code")]
    InvalidCode,
    /// Password-reset code past its lifetime.
    #[error("Verification code expired. Please request a new one")]
    ExpiredCode,
    /// New password rejected by the pool's password policy.
    #[error("Password must have 8+ chars, uppercase, lowercase, number, and symbol")]
    WeakPassword,
    /// Anything else, including transport and decode failures.
    #[error("An error occurred. Please try again.")]
    Failed,
}

impl AuthError {
    /// Classify a provider-reported error type name.
    ///
    /// Accepts both bare names (`NotAuthorizedException`) and namespaced
    /// ones (`com.amazonaws...#NotAuthorizedException`).
    #[must_use]
    pub fn from_provider_kind(kind: &str) -> Self {
        let name = kind.rsplit('#').next().unwrap_or(kind).trim();
        match name {
            "UserNotFoundException" | "NotAuthorizedException" => Self::InvalidCredentials,
            "UserNotConfirmedException" => Self::VerificationRequired,
            "PasswordResetRequiredException" => Self::ResetRequired,
            "TooManyRequestsException" | "LimitExceededException" | "TooManyFailedAttemptsException" => {
                Self::RateLimited
            }
            "CodeMismatchException" => Self::InvalidCode,
            "ExpiredCodeException" => Self::ExpiredCode,
            "InvalidPasswordException" => Self::WeakPassword,
            _ => Self::Failed,
        }
    }
}

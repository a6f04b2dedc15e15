//! Identity provider port.
//!
//! DESIGN
//! ======
//! The flow controller talks to the hosted identity service only through
//! [`IdentityProvider`], a narrow async operation set. Adapters (`cognito`)
//! translate that set onto a concrete wire API and classify every failure
//! into [`AuthError`] before returning.

pub mod cognito;
mod error;

use std::collections::BTreeMap;

use secrecy::SecretString;

pub use error::AuthError;

use crate::session::TokenSet;

/// Challenge name the provider uses when an admin-created account must pick
/// its own password.
pub const NEW_PASSWORD_REQUIRED: &str = "NEW_PASSWORD_REQUIRED";

/// Extra step the provider demands before sign-in completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInStep {
    /// The user must set a new password (`confirm_sign_in` with it).
    NewPasswordRequired,
    /// A step this client does not implement (MFA and friends).
    Other(String),
}

impl SignInStep {
    #[must_use]
    pub fn from_challenge(name: &str) -> Self {
        if name == NEW_PASSWORD_REQUIRED { Self::NewPasswordRequired } else { Self::Other(name.to_owned()) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::NewPasswordRequired => NEW_PASSWORD_REQUIRED,
            Self::Other(name) => name,
        }
    }
}

/// Result of `sign_in` / `confirm_sign_in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// Fully signed in; the provider now holds tokens.
    SignedIn,
    /// Not yet signed in; the given step comes next.
    Continue(SignInStep),
}

/// The signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserIdentity {
    pub username: String,
    pub attributes: BTreeMap<String, String>,
}

impl UserIdentity {
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.attributes.get("email").map(String::as_str)
    }
}

/// Operations consumed from the hosted identity service.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a sign-in with an identifier and secret.
    async fn sign_in(&self, username: &str, password: &SecretString) -> Result<SignInOutcome, AuthError>;

    /// Answer the pending challenge (the new password, for `NEW_PASSWORD_REQUIRED`).
    async fn confirm_sign_in(&self, challenge_response: &SecretString) -> Result<SignInOutcome, AuthError>;

    /// Ask the provider to send a password-reset code.
    async fn start_password_reset(&self, username: &str) -> Result<(), AuthError>;

    /// Complete a password reset with the emailed code.
    async fn confirm_password_reset(
        &self,
        username: &str,
        code: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), AuthError>;

    /// End the provider-side session and drop cached tokens.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Tokens for the current session, refreshed if the provider can.
    async fn fetch_current_session(&self) -> Result<Option<TokenSet>, AuthError>;

    /// The signed-in user.
    async fn current_user(&self) -> Result<UserIdentity, AuthError>;
}

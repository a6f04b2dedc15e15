//! Cognito user-pool adapter for [`IdentityProvider`].
//!
//! SYSTEM CONTEXT
//! ==============
//! Speaks the user-pool JSON API directly: every operation is a `POST` to
//! the regional endpoint with an `X-Amz-Target` naming the action. Public
//! app clients need no request signing for the operations used here.
//!
//! DESIGN
//! ======
//! The adapter owns a token cache (`cognito.<clientId>.tokens`) in the same
//! [`KeyValueStorage`] the session store uses, so the provider-managed
//! strategy survives restarts. A pending sign-in challenge lives in memory
//! only; losing it means signing in again.
//!
//! Every failure is classified into [`AuthError`] here. The raw `__type`
//! and message are logged and go no further.
//!
//! TRADE-OFFS
//! ==========
//! Refresh happens lazily on `fetch_current_session` once the cached access
//! token has expired, not on a timer. A rejected refresh token drops the
//! cache and reads as signed out.

#[cfg(test)]
#[path = "cognito_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use super::{AuthError, IdentityProvider, SignInOutcome, SignInStep, UserIdentity};
use crate::config::{CognitoConfig, ConfigError, HttpTimeouts};
use crate::session::{Clock, SystemClock, TokenSet};
use crate::storage::{KeyValueStorage, load_json, save_json};

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AWSCognitoIdentityProviderService.";

const USER_PASSWORD_AUTH: &str = "USER_PASSWORD_AUTH";
const REFRESH_TOKEN_AUTH: &str = "REFRESH_TOKEN_AUTH";

/// Storage key of the adapter's token cache for an app client.
#[must_use]
pub fn token_cache_key(client_id: &str) -> String {
    format!("cognito.{client_id}.tokens")
}

// =============================================================================
// CACHE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedTokens {
    access_token: String,
    id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    /// Epoch milliseconds.
    expires_at: i64,
}

impl CachedTokens {
    fn is_live_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }

    /// Whole seconds left, rounded down. Under a second counts as expired.
    fn remaining_secs(&self, now_ms: i64) -> Option<u64> {
        let left_ms = self.expires_at.checked_sub(now_ms)?;
        let secs = (left_ms / 1000).unsigned_abs();
        (left_ms > 0 && secs > 0).then_some(secs)
    }
}

#[derive(Debug, Clone)]
struct PendingChallenge {
    username: String,
    session: String,
    name: String,
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct CognitoProvider {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    challenge: Mutex<Option<PendingChallenge>>,
}

impl CognitoProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: &CognitoConfig,
        timeouts: HttpTimeouts,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            http: timeouts.client()?,
            endpoint: config.endpoint(),
            client_id: config.client_id.clone(),
            storage,
            clock: Arc::new(SystemClock),
            challenge: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn cache_key(&self) -> String {
        token_cache_key(&self.client_id)
    }

    fn cached(&self) -> Option<CachedTokens> {
        load_json(&*self.storage, &self.cache_key())
    }

    fn forget_tokens(&self) {
        if let Err(e) = self.storage.remove_item(&self.cache_key()) {
            tracing::warn!(error = %e, "failed to remove cached provider tokens");
        }
    }

    fn store_tokens(&self, result: AuthenticationResult, prior_refresh: Option<String>) -> Result<(), AuthError> {
        let lifetime_ms = i64::try_from(result.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let cached = CachedTokens {
            access_token: result.access_token,
            id_token: result.id_token,
            refresh_token: result.refresh_token.or(prior_refresh),
            expires_at: self.clock.now_ms().saturating_add(lifetime_ms),
        };
        save_json(&*self.storage, &self.cache_key(), &cached).map_err(|e| {
            tracing::warn!(error = %e, "failed to cache provider tokens");
            AuthError::Failed
        })
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Option<PendingChallenge>> {
        self.challenge.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turn an auth response into an outcome, caching tokens or remembering
    /// the challenge as appropriate.
    fn absorb(&self, username: &str, response: AuthResponse) -> Result<SignInOutcome, AuthError> {
        if let Some(result) = response.authentication_result {
            *self.pending() = None;
            self.store_tokens(result, None)?;
            tracing::info!("provider sign-in complete");
            return Ok(SignInOutcome::SignedIn);
        }
        match (response.challenge_name, response.session) {
            (Some(name), Some(session)) => {
                tracing::info!(challenge = %name, "provider requested sign-in challenge");
                let step = SignInStep::from_challenge(&name);
                *self.pending() = Some(PendingChallenge { username: username.to_owned(), session, name });
                Ok(SignInOutcome::Continue(step))
            }
            (name, _) => {
                tracing::warn!(challenge = ?name, "auth response carried neither tokens nor a usable challenge");
                Err(AuthError::Failed)
            }
        }
    }

    async fn refresh(&self, cached: &CachedTokens, refresh_token: &str) -> Result<Option<TokenSet>, AuthError> {
        let request = InitiateAuthRequest {
            auth_flow: REFRESH_TOKEN_AUTH,
            client_id: &self.client_id,
            auth_parameters: BTreeMap::from([("REFRESH_TOKEN", refresh_token)]),
        };
        let response: AuthResponse = match self.call("InitiateAuth", &request).await {
            Ok(response) => response,
            Err(AuthError::InvalidCredentials) => {
                tracing::info!("refresh token rejected, dropping cached session");
                self.forget_tokens();
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(result) = response.authentication_result else {
            tracing::warn!("refresh response carried no tokens");
            return Err(AuthError::Failed);
        };
        self.store_tokens(result, cached.refresh_token.clone())?;
        tracing::debug!("provider tokens refreshed");
        Ok(self.cached().and_then(|fresh| self.token_set(&fresh)))
    }

    fn token_set(&self, cached: &CachedTokens) -> Option<TokenSet> {
        let expires_in = cached.remaining_secs(self.clock.now_ms())?;
        Some(TokenSet {
            access_token: cached.access_token.clone(),
            id_token: cached.id_token.clone(),
            expires_in,
        })
    }

    /// `POST` one user-pool action and decode its response.
    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| {
            tracing::warn!(operation, error = %e, "failed to encode provider request");
            AuthError::Failed
        })?;
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header("X-Amz-Target", format!("{TARGET_PREFIX}{operation}"))
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(operation, error = %e, "identity provider unreachable");
                AuthError::Failed
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "failed to read provider response");
            AuthError::Failed
        })?;

        if !(200..300).contains(&status) {
            return Err(classify_error(operation, status, &text));
        }
        parse_body(operation, &text)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for CognitoProvider {
    async fn sign_in(&self, username: &str, password: &SecretString) -> Result<SignInOutcome, AuthError> {
        *self.pending() = None;
        let request = InitiateAuthRequest {
            auth_flow: USER_PASSWORD_AUTH,
            client_id: &self.client_id,
            auth_parameters: BTreeMap::from([("USERNAME", username), ("PASSWORD", password.expose_secret())]),
        };
        let response: AuthResponse = self.call("InitiateAuth", &request).await?;
        self.absorb(username, response)
    }

    async fn confirm_sign_in(&self, challenge_response: &SecretString) -> Result<SignInOutcome, AuthError> {
        let Some(pending) = self.pending().clone() else {
            tracing::warn!("confirm_sign_in called with no pending challenge");
            return Err(AuthError::Failed);
        };
        let mut responses = BTreeMap::from([("USERNAME", pending.username.as_str())]);
        match SignInStep::from_challenge(&pending.name) {
            SignInStep::NewPasswordRequired => {
                responses.insert("NEW_PASSWORD", challenge_response.expose_secret());
            }
            SignInStep::Other(name) => {
                tracing::warn!(challenge = %name, "unsupported challenge");
                return Err(AuthError::Failed);
            }
        }
        let request = ChallengeRequest {
            challenge_name: &pending.name,
            client_id: &self.client_id,
            session: &pending.session,
            challenge_responses: responses,
        };
        let response: AuthResponse = self.call("RespondToAuthChallenge", &request).await?;
        self.absorb(&pending.username, response)
    }

    async fn start_password_reset(&self, username: &str) -> Result<(), AuthError> {
        let request = ForgotPasswordRequest { client_id: &self.client_id, username };
        let _: IgnoredAny = self.call("ForgotPassword", &request).await?;
        tracing::info!("password reset code requested");
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        username: &str,
        code: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), AuthError> {
        let request = ConfirmForgotPasswordRequest {
            client_id: &self.client_id,
            username,
            confirmation_code: code.expose_secret(),
            password: new_password.expose_secret(),
        };
        let _: IgnoredAny = self.call("ConfirmForgotPassword", &request).await?;
        tracing::info!("password reset confirmed");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.pending() = None;
        let Some(cached) = self.cached() else {
            return Ok(());
        };
        let outcome = if cached.is_live_at(self.clock.now_ms()) {
            let request = AccessTokenRequest { access_token: &cached.access_token };
            match self.call::<_, IgnoredAny>("GlobalSignOut", &request).await {
                // Token already revoked elsewhere.
                Ok(_) | Err(AuthError::InvalidCredentials) => Ok(()),
                Err(e) => Err(e),
            }
        } else {
            Ok(())
        };
        self.forget_tokens();
        tracing::info!("provider session signed out");
        outcome
    }

    async fn fetch_current_session(&self) -> Result<Option<TokenSet>, AuthError> {
        let Some(cached) = self.cached() else {
            return Ok(None);
        };
        if let Some(tokens) = self.token_set(&cached) {
            return Ok(Some(tokens));
        }
        match cached.refresh_token.as_deref() {
            Some(refresh_token) => self.refresh(&cached, refresh_token).await,
            None => {
                tracing::debug!("cached provider tokens expired");
                self.forget_tokens();
                Ok(None)
            }
        }
    }

    async fn current_user(&self) -> Result<UserIdentity, AuthError> {
        let Some(tokens) = self.fetch_current_session().await? else {
            return Err(AuthError::Failed);
        };
        let request = AccessTokenRequest { access_token: &tokens.access_token };
        let user: GetUserResponse = self.call("GetUser", &request).await?;
        Ok(UserIdentity {
            username: user.username,
            attributes: user.user_attributes.into_iter().map(|a| (a.name, a.value)).collect(),
        })
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: BTreeMap<&'a str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChallengeRequest<'a> {
    challenge_name: &'a str,
    client_id: &'a str,
    session: &'a str,
    challenge_responses: BTreeMap<&'a str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ForgotPasswordRequest<'a> {
    client_id: &'a str,
    username: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConfirmForgotPasswordRequest<'a> {
    client_id: &'a str,
    username: &'a str,
    confirmation_code: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AccessTokenRequest<'a> {
    access_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthenticationResult>,
    #[serde(default)]
    challenge_name: Option<String>,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetUserResponse {
    username: String,
    #[serde(default)]
    user_attributes: Vec<UserAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserAttribute {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_body<R: DeserializeOwned>(operation: &str, text: &str) -> Result<R, AuthError> {
    let text = if text.trim().is_empty() { "{}" } else { text };
    serde_json::from_str(text).map_err(|e| {
        tracing::warn!(operation, error = %e, "undecodable provider response");
        AuthError::Failed
    })
}

/// Classify a non-2xx provider response.
fn classify_error(operation: &str, status: u16, body: &str) -> AuthError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => {
            tracing::warn!(
                operation,
                status,
                kind = %err.kind,
                message = err.message.as_deref().unwrap_or(""),
                "identity provider rejected request"
            );
            AuthError::from_provider_kind(&err.kind)
        }
        Err(_) => {
            tracing::warn!(operation, status, "identity provider failed without an error body");
            AuthError::Failed
        }
    }
}

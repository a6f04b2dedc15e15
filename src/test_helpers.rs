//! Fakes shared by unit tests across modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::identity::{AuthError, IdentityProvider, SignInOutcome, UserIdentity};
use crate::session::{Clock, TokenSet};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self { now: AtomicI64::new(now_ms) }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now.fetch_add(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

pub fn issued_tokens() -> TokenSet {
    TokenSet { access_token: "access-1".into(), id_token: "id-1".into(), expires_in: 3600 }
}

// =============================================================================
// MockProvider
// =============================================================================

/// Scripted identity provider.
///
/// Each operation pops its next scripted result; an empty script means
/// success. Successful sign-ins make `fetch_current_session` return
/// [`issued_tokens`].
#[derive(Default)]
pub struct MockProvider {
    pub sign_in_results: Mutex<VecDeque<Result<SignInOutcome, AuthError>>>,
    pub confirm_results: Mutex<VecDeque<Result<SignInOutcome, AuthError>>>,
    pub reset_start_results: Mutex<VecDeque<Result<(), AuthError>>>,
    pub reset_confirm_results: Mutex<VecDeque<Result<(), AuthError>>>,
    pub calls: Mutex<Vec<String>>,
    pub passwords: Mutex<Vec<String>>,
    pub session: Mutex<Option<TokenSet>>,
    /// Simulated network latency for every call.
    pub latency: Option<Duration>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn script_sign_in(self, result: Result<SignInOutcome, AuthError>) -> Self {
        lock(&self.sign_in_results).push_back(result);
        self
    }

    pub fn script_confirm(self, result: Result<SignInOutcome, AuthError>) -> Self {
        lock(&self.confirm_results).push_back(result);
        self
    }

    pub fn script_reset_start(self, result: Result<(), AuthError>) -> Self {
        lock(&self.reset_start_results).push_back(result);
        self
    }

    pub fn script_reset_confirm(self, result: Result<(), AuthError>) -> Self {
        lock(&self.reset_confirm_results).push_back(result);
        self
    }

    pub fn signed_in(self) -> Self {
        *lock(&self.session) = Some(issued_tokens());
        self
    }

    pub fn count(&self, op: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn last_password(&self) -> Option<String> {
        lock(&self.passwords).last().cloned()
    }

    async fn enter(&self, op: &str) {
        lock(&self.calls).push(op.to_owned());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn settle_sign_in(&self, result: Result<SignInOutcome, AuthError>) -> Result<SignInOutcome, AuthError> {
        if matches!(result, Ok(SignInOutcome::SignedIn)) {
            *lock(&self.session) = Some(issued_tokens());
        }
        result
    }
}

#[async_trait::async_trait]
impl IdentityProvider for MockProvider {
    async fn sign_in(&self, _username: &str, password: &SecretString) -> Result<SignInOutcome, AuthError> {
        lock(&self.passwords).push(password.expose_secret().to_owned());
        self.enter("sign_in").await;
        let next = lock(&self.sign_in_results).pop_front();
        self.settle_sign_in(next.unwrap_or(Ok(SignInOutcome::SignedIn)))
    }

    async fn confirm_sign_in(&self, challenge_response: &SecretString) -> Result<SignInOutcome, AuthError> {
        lock(&self.passwords).push(challenge_response.expose_secret().to_owned());
        self.enter("confirm_sign_in").await;
        let next = lock(&self.confirm_results).pop_front();
        self.settle_sign_in(next.unwrap_or(Ok(SignInOutcome::SignedIn)))
    }

    async fn start_password_reset(&self, _username: &str) -> Result<(), AuthError> {
        self.enter("start_password_reset").await;
        lock(&self.reset_start_results).pop_front().unwrap_or(Ok(()))
    }

    async fn confirm_password_reset(
        &self,
        _username: &str,
        _code: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), AuthError> {
        lock(&self.passwords).push(new_password.expose_secret().to_owned());
        self.enter("confirm_password_reset").await;
        lock(&self.reset_confirm_results).pop_front().unwrap_or(Ok(()))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.enter("sign_out").await;
        *lock(&self.session) = None;
        Ok(())
    }

    async fn fetch_current_session(&self) -> Result<Option<TokenSet>, AuthError> {
        lock(&self.calls).push("fetch_current_session".to_owned());
        Ok(lock(&self.session).clone())
    }

    async fn current_user(&self) -> Result<UserIdentity, AuthError> {
        self.enter("current_user").await;
        if lock(&self.session).is_some() {
            Ok(UserIdentity { username: "author".into(), ..UserIdentity::default() })
        } else {
            Err(AuthError::Failed)
        }
    }
}

//! Auth flow controller: the login / reset / new-password state machine.
//!
//! SYSTEM CONTEXT
//! ==============
//! The admin front end owns one [`AuthFlow`] per login view. It feeds field
//! edits and user actions in, renders [`FlowSnapshot`]s out, and treats
//! [`Submit::LoginSuccess`] as the signal to re-query the session store.
//!
//! ```text
//!   LoggingIn --forgot--> ResettingPassword(Requesting) --code sent--> ResettingPassword(Confirming)
//!      |  ^                         |                                         |
//!      |  +--------- cancel --------+------------- cancel / reset done (+2s) -+
//!      |
//!      +--new password required--> ConfirmingNewPassword --cancel--> LoggingIn
//! ```
//!
//! DESIGN
//! ======
//! - Single flight: `submitting` is checked and set under the lock before
//!   any provider call, so a second submit never reaches the provider.
//! - The lock is never held across an `.await`. Each submit captures its
//!   inputs, releases the lock, awaits the provider, then re-locks to apply
//!   the result.
//! - Every result is tagged with the generation current at submit time.
//!   `unmount`, `cancel`, and `restart` bump the generation, so a late
//!   result for a view that moved on is dropped untouched.
//! - Failures set an error notice and leave entered fields alone.
//!
//! TRADE-OFFS
//! ==========
//! The post-reset return delay is awaited by the caller rather than on a
//! detached timer, so the controller owns no background tasks. `submit`
//! awaits it inline; a front end that must render the success notice first
//! calls `submit_now`, renders, then `await_return`.

#[cfg(test)]
#[path = "flow_test.rs"]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::identity::{AuthError, IdentityProvider, SignInOutcome, SignInStep};
use crate::session::SessionStore;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const RESET_RETURN_DELAY: Duration = Duration::from_secs(2);

pub const PASSWORD_MISMATCH: &str = "Passwords do not match";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters";
pub const RESET_CODE_SENT: &str = "Verification code sent to your email";
pub const RESET_COMPLETE: &str = "Password reset successfully! You can now log in.";
pub const NEW_PASSWORD_PROMPT: &str = "Please set a new password for your account.";
pub const MISSING_CREDENTIALS: &str = "Enter your email and password.";
pub const MISSING_EMAIL: &str = "Enter your email address.";
pub const MISSING_RESET_FIELDS: &str = "Enter the verification code and a new password.";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    /// Waiting for the email to send a code to.
    Requesting,
    /// Code sent; waiting for code and new password.
    Confirming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    LoggingIn,
    ConfirmingNewPassword,
    ResettingPassword(ResetStep),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    Success,
    Info,
}

/// Dismissible inline message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn error(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, message: message.into() }
    }

    fn success(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Success, message: message.into() }
    }

    fn info(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Info, message: message.into() }
    }
}

/// What a submit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    /// Not accepted: in flight, finished, returning, unmounted, or the
    /// result arrived for a view that moved on.
    Ignored,
    /// Local validation failed; no provider call was made.
    Invalid,
    /// The provider call failed; an error notice is set.
    Failed,
    /// The flow moved on (or showed a success notice).
    Continued,
    /// Sign-in complete and the session persisted. Emitted once per attempt.
    LoginSuccess,
}

/// Form memory. Never persisted.
#[derive(Debug, Default)]
struct Credentials {
    email: String,
    password: SecretString,
    new_password: SecretString,
    confirm_password: SecretString,
    code: SecretString,
}

impl Credentials {
    fn clear_in_progress(&mut self) {
        self.new_password = SecretString::default();
        self.confirm_password = SecretString::default();
        self.code = SecretString::default();
    }

    fn clear_all(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
struct FlowInner {
    state: FlowState,
    notice: Option<Notice>,
    form: Credentials,
    submitting: bool,
    /// Reset done; waiting out the return delay.
    returning: bool,
    completed: bool,
    unmounted: bool,
    generation: u64,
}

impl FlowInner {
    fn idle(&self) -> bool {
        !self.unmounted && !self.completed && !self.submitting && !self.returning
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Render view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub notice: Option<Notice>,
    pub email: String,
    pub password_entered: bool,
    pub submitting: bool,
    pub returning: bool,
    pub completed: bool,
    pub mounted: bool,
}

/// Inputs captured for one provider call.
enum Request {
    SignIn { email: String, password: SecretString },
    NewPassword { password: SecretString },
    ResetStart { email: String },
    ResetConfirm { email: String, code: SecretString, new_password: SecretString },
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

/// Local check for a chosen password and its confirmation.
///
/// # Errors
///
/// Returns the user-facing message: mismatch is reported before length.
pub fn validate_new_password(new_password: &str, confirmation: &str) -> Result<(), &'static str> {
    if new_password != confirmation {
        return Err(PASSWORD_MISMATCH);
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PASSWORD_TOO_SHORT);
    }
    Ok(())
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct AuthFlow<P: ?Sized> {
    provider: Arc<P>,
    store: Arc<dyn SessionStore>,
    inner: Arc<Mutex<FlowInner>>,
    allow_new_password: bool,
    return_delay: Duration,
}

impl<P: ?Sized> Clone for AuthFlow<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
            inner: Arc::clone(&self.inner),
            allow_new_password: self.allow_new_password,
            return_delay: self.return_delay,
        }
    }
}

impl<P: IdentityProvider + ?Sized> AuthFlow<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            provider,
            store,
            inner: Arc::new(Mutex::new(FlowInner::default())),
            allow_new_password: true,
            return_delay: RESET_RETURN_DELAY,
        }
    }

    /// Treat a forced new-password step like any other unsupported step.
    #[must_use]
    pub fn without_new_password_challenge(mut self) -> Self {
        self.allow_new_password = false;
        self
    }

    #[must_use]
    pub fn with_return_delay(mut self, delay: Duration) -> Self {
        self.return_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> FlowSnapshot {
        let inner = self.lock();
        FlowSnapshot {
            state: inner.state,
            notice: inner.notice.clone(),
            email: inner.form.email.clone(),
            password_entered: !inner.form.password.expose_secret().is_empty(),
            submitting: inner.submitting,
            returning: inner.returning,
            completed: inner.completed,
            mounted: !inner.unmounted,
        }
    }

    #[must_use]
    pub fn state(&self) -> FlowState {
        self.lock().state
    }

    // -------------------------------------------------------------------------
    // Field edits
    // -------------------------------------------------------------------------

    pub fn set_email(&self, email: impl Into<String>) {
        self.lock().form.email = email.into();
    }

    pub fn set_password(&self, password: SecretString) {
        self.lock().form.password = password;
    }

    pub fn set_new_password(&self, password: SecretString) {
        self.lock().form.new_password = password;
    }

    pub fn set_confirm_password(&self, password: SecretString) {
        self.lock().form.confirm_password = password;
    }

    pub fn set_code(&self, code: SecretString) {
        self.lock().form.code = code;
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    pub fn dismiss_notice(&self) {
        self.lock().notice = None;
    }

    /// `LoggingIn` -> `ResettingPassword(Requesting)`, keeping the email.
    pub fn forgot_password(&self) -> bool {
        let mut inner = self.lock();
        if !inner.idle() || inner.state != FlowState::LoggingIn {
            return false;
        }
        inner.state = FlowState::ResettingPassword(ResetStep::Requesting);
        inner.notice = None;
        inner.form.clear_in_progress();
        tracing::debug!("flow: forgot password");
        true
    }

    /// Back to `LoggingIn`, discarding passwords and codes in progress.
    ///
    /// Ignored while a provider call is in flight. Honoured during the
    /// post-reset return delay, which then does nothing.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.unmounted || inner.completed || inner.submitting || inner.state == FlowState::LoggingIn {
            return false;
        }
        inner.state = FlowState::LoggingIn;
        inner.notice = None;
        inner.returning = false;
        inner.form.clear_in_progress();
        inner.bump();
        tracing::debug!("flow: cancelled");
        true
    }

    /// Start a fresh attempt. Keeps the email.
    pub fn restart(&self) -> bool {
        let mut inner = self.lock();
        if inner.unmounted || inner.submitting {
            return false;
        }
        let email = std::mem::take(&mut inner.form.email);
        let generation = inner.generation;
        *inner = FlowInner::default();
        inner.form.email = email;
        inner.generation = generation;
        inner.bump();
        true
    }

    /// The view is gone: drop credentials and ignore any pending result.
    pub fn unmount(&self) {
        let mut inner = self.lock();
        inner.unmounted = true;
        inner.submitting = false;
        inner.returning = false;
        inner.form.clear_all();
        inner.bump();
        tracing::debug!("flow: unmounted");
    }

    // -------------------------------------------------------------------------
    // Submit
    // -------------------------------------------------------------------------

    /// Submit the form for the current state.
    ///
    /// After a successful reset this also waits out the return delay and
    /// moves back to `LoggingIn`.
    pub async fn submit(&self) -> Submit {
        let outcome = self.submit_now().await;
        if outcome == Submit::Continued {
            self.await_return().await;
        }
        outcome
    }

    /// Like [`Self::submit`], but a successful reset returns as soon as the
    /// success notice is set. The return to `LoggingIn` stays pending until
    /// [`Self::await_return`] runs.
    pub async fn submit_now(&self) -> Submit {
        let (generation, request) = match self.begin() {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };

        match request {
            Request::SignIn { email, password } => {
                let result = self.provider.sign_in(&email, &password).await;
                self.finish_sign_in(generation, result).await
            }
            Request::NewPassword { password } => {
                let result = self.provider.confirm_sign_in(&password).await;
                self.finish_sign_in(generation, result).await
            }
            Request::ResetStart { email } => {
                let result = self.provider.start_password_reset(&email).await;
                self.settle(generation, |inner| match result {
                    Ok(()) => {
                        tracing::info!("flow: reset code sent");
                        inner.state = FlowState::ResettingPassword(ResetStep::Confirming);
                        inner.notice = Some(Notice::success(RESET_CODE_SENT));
                        Submit::Continued
                    }
                    Err(e) => fail(inner, &e),
                })
            }
            Request::ResetConfirm { email, code, new_password } => {
                let result = self.provider.confirm_password_reset(&email, &code, &new_password).await;
                self.finish_reset(generation, result)
            }
        }
    }

    /// Validate and capture inputs, then mark the flow as submitting.
    fn begin(&self) -> Result<(u64, Request), Submit> {
        let mut inner = self.lock();
        if !inner.idle() {
            tracing::debug!(state = ?inner.state, "flow: submit ignored");
            return Err(Submit::Ignored);
        }

        let request = match inner.state {
            FlowState::LoggingIn => {
                let email = inner.form.email.trim().to_owned();
                if email.is_empty() || inner.form.password.expose_secret().is_empty() {
                    return Err(invalid(&mut inner, MISSING_CREDENTIALS));
                }
                Request::SignIn { email, password: copy_secret(&inner.form.password) }
            }
            FlowState::ConfirmingNewPassword => {
                let checked = validate_new_password(
                    inner.form.new_password.expose_secret(),
                    inner.form.confirm_password.expose_secret(),
                );
                if let Err(message) = checked {
                    return Err(invalid(&mut inner, message));
                }
                Request::NewPassword { password: copy_secret(&inner.form.new_password) }
            }
            FlowState::ResettingPassword(ResetStep::Requesting) => {
                let email = inner.form.email.trim().to_owned();
                if email.is_empty() {
                    return Err(invalid(&mut inner, MISSING_EMAIL));
                }
                Request::ResetStart { email }
            }
            FlowState::ResettingPassword(ResetStep::Confirming) => {
                let email = inner.form.email.trim().to_owned();
                let code = inner.form.code.expose_secret().trim().to_owned();
                if email.is_empty() || code.is_empty() || inner.form.new_password.expose_secret().is_empty() {
                    return Err(invalid(&mut inner, MISSING_RESET_FIELDS));
                }
                Request::ResetConfirm {
                    email,
                    code: SecretString::from(code),
                    new_password: copy_secret(&inner.form.new_password),
                }
            }
        };

        inner.notice = None;
        inner.submitting = true;
        Ok((inner.generation, request))
    }

    /// Apply a provider result unless the view moved on since `generation`.
    fn settle(&self, generation: u64, apply: impl FnOnce(&mut FlowInner) -> Submit) -> Submit {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("flow: discarding stale result");
            return Submit::Ignored;
        }
        inner.submitting = false;
        apply(&mut *inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    async fn finish_sign_in(&self, generation: u64, result: Result<SignInOutcome, AuthError>) -> Submit {
        match result {
            Ok(SignInOutcome::SignedIn) => {
                if !self.is_current(generation) {
                    tracing::debug!("flow: sign-in finished after the view moved on");
                    return Submit::Ignored;
                }
                let persisted = self.persist_session().await;
                self.settle(generation, |inner| match persisted {
                    Ok(()) => {
                        tracing::info!("flow: login success");
                        inner.completed = true;
                        inner.notice = None;
                        inner.form.clear_all();
                        Submit::LoginSuccess
                    }
                    Err(e) => fail(inner, &e),
                })
            }
            Ok(SignInOutcome::Continue(SignInStep::NewPasswordRequired)) if self.allow_new_password => {
                self.settle(generation, |inner| {
                    if inner.state == FlowState::ConfirmingNewPassword {
                        return fail_unexpected(inner, &SignInStep::NewPasswordRequired);
                    }
                    tracing::info!("flow: new password required");
                    inner.state = FlowState::ConfirmingNewPassword;
                    inner.notice = Some(Notice::info(NEW_PASSWORD_PROMPT));
                    inner.form.clear_in_progress();
                    Submit::Continued
                })
            }
            Ok(SignInOutcome::Continue(step)) => self.settle(generation, |inner| fail_unexpected(inner, &step)),
            Err(e) => self.settle(generation, |inner| fail(inner, &e)),
        }
    }

    fn finish_reset(&self, generation: u64, result: Result<(), AuthError>) -> Submit {
        self.settle(generation, |inner| match result {
            Ok(()) => {
                tracing::info!("flow: password reset complete");
                inner.notice = Some(Notice::success(RESET_COMPLETE));
                inner.returning = true;
                inner.form.password = SecretString::default();
                inner.form.clear_in_progress();
                Submit::Continued
            }
            Err(e) => fail(inner, &e),
        })
    }

    /// Wait out the post-reset delay, then return to `LoggingIn`.
    ///
    /// Returns at once when no return is pending. A cancel, restart, or
    /// unmount during the delay wins.
    pub async fn await_return(&self) {
        let generation = {
            let inner = self.lock();
            if !inner.returning {
                return;
            }
            inner.generation
        };

        tokio::time::sleep(self.return_delay).await;

        let mut inner = self.lock();
        if inner.generation == generation && inner.returning {
            inner.returning = false;
            inner.state = FlowState::LoggingIn;
            tracing::debug!("flow: returned to login after reset");
        }
    }

    /// Copy the provider's fresh tokens into the session store.
    async fn persist_session(&self) -> Result<(), AuthError> {
        let tokens = match self.provider.fetch_current_session().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                tracing::warn!("provider reported sign-in but holds no tokens");
                return Err(AuthError::Failed);
            }
            Err(e) => return Err(e),
        };
        self.store.save_session(&tokens).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to persist session");
            AuthError::Failed
        })
    }
}

fn invalid(inner: &mut FlowInner, message: &str) -> Submit {
    inner.notice = Some(Notice::error(message));
    Submit::Invalid
}

fn fail(inner: &mut FlowInner, error: &AuthError) -> Submit {
    tracing::info!(state = ?inner.state, error = ?error, "flow: provider call failed");
    inner.notice = Some(Notice::error(error.to_string()));
    Submit::Failed
}

fn fail_unexpected(inner: &mut FlowInner, step: &SignInStep) -> Submit {
    tracing::warn!(step = step.name(), "flow: unsupported sign-in step");
    inner.notice = Some(Notice::error(format!("Unexpected sign-in step: {}", step.name())));
    Submit::Failed
}

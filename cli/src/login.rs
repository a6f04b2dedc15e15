//! Interactive driver for the auth flow controller.
//!
//! Renders each [`FlowState`] as a small menu, copies answers into the
//! controller, and submits. All terminal I/O goes through [`Prompter`] so the
//! loop can be exercised with scripted answers.

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;

use blogfront::flow::{AuthFlow, FlowState, Notice, NoticeKind, ResetStep, Submit};
use blogfront::identity::IdentityProvider;
use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt failed: {0}")]
    Terminal(#[from] dialoguer::Error),
    #[error("input closed")]
    Closed,
}

/// Terminal interaction used by [`run`].
pub trait Prompter {
    fn input(&mut self, prompt: &str, initial: &str) -> Result<String, PromptError>;
    fn secret(&mut self, prompt: &str) -> Result<SecretString, PromptError>;
    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<usize, PromptError>;
    fn show(&mut self, line: &str);
}

/// How the interactive login ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn,
    Abandoned,
}

// =============================================================================
// TERMINAL
// =============================================================================

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&mut self, prompt: &str, initial: &str) -> Result<String, PromptError> {
        let mut input = dialoguer::Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if !initial.is_empty() {
            input = input.with_initial_text(initial);
        }
        Ok(input.interact_text()?)
    }

    fn secret(&mut self, prompt: &str) -> Result<SecretString, PromptError> {
        let value = dialoguer::Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(SecretString::from(value))
    }

    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<usize, PromptError> {
        Ok(dialoguer::Select::new().with_prompt(prompt).items(options).default(0).interact()?)
    }

    fn show(&mut self, line: &str) {
        eprintln!("{line}");
    }
}

// =============================================================================
// LOOP
// =============================================================================

fn render(notice: &Notice) -> String {
    let tag = match notice.kind {
        NoticeKind::Error => "error",
        NoticeKind::Success => "ok",
        NoticeKind::Info => "note",
    };
    format!("[{tag}] {}", notice.message)
}

/// Drive `flow` until sign-in succeeds or the user quits.
///
/// The flow is unmounted on quit and on prompt failure.
///
/// # Errors
///
/// Returns an error when the terminal cannot be read.
pub async fn run<P>(flow: &AuthFlow<P>, prompter: &mut dyn Prompter) -> Result<LoginOutcome, PromptError>
where
    P: IdentityProvider + ?Sized,
{
    let outcome = drive(flow, prompter).await;
    if !matches!(outcome, Ok(LoginOutcome::SignedIn)) {
        flow.unmount();
    }
    outcome
}

async fn drive<P>(flow: &AuthFlow<P>, prompter: &mut dyn Prompter) -> Result<LoginOutcome, PromptError>
where
    P: IdentityProvider + ?Sized,
{
    loop {
        let snapshot = flow.snapshot();
        match snapshot.state {
            FlowState::LoggingIn => {
                match prompter.choose("Admin login", &["Sign in", "Forgot password", "Quit"])? {
                    0 => {
                        let email = prompter.input("Email", &snapshot.email)?;
                        flow.set_email(email);
                        flow.set_password(prompter.secret("Password")?);
                    }
                    1 => {
                        flow.forgot_password();
                        continue;
                    }
                    _ => return Ok(LoginOutcome::Abandoned),
                }
            }
            FlowState::ConfirmingNewPassword => {
                if prompter.choose("New password required", &["Set new password", "Cancel"])? != 0 {
                    flow.cancel();
                    continue;
                }
                flow.set_new_password(prompter.secret("New password")?);
                flow.set_confirm_password(prompter.secret("Confirm new password")?);
            }
            FlowState::ResettingPassword(ResetStep::Requesting) => {
                if prompter.choose("Reset password", &["Send code", "Cancel"])? != 0 {
                    flow.cancel();
                    continue;
                }
                let email = prompter.input("Email", &snapshot.email)?;
                flow.set_email(email);
            }
            FlowState::ResettingPassword(ResetStep::Confirming) => {
                if prompter.choose("Reset password", &["Enter code", "Cancel"])? != 0 {
                    flow.cancel();
                    continue;
                }
                let code = prompter.input("Verification code", "")?;
                flow.set_code(SecretString::from(code));
                flow.set_new_password(prompter.secret("New password")?);
            }
        }

        let submitted = flow.submit_now().await;
        if let Some(notice) = flow.snapshot().notice {
            prompter.show(&render(&notice));
            flow.dismiss_notice();
        }
        // Leave the reset confirmation on screen before the login menu.
        flow.await_return().await;
        if submitted == Submit::LoginSuccess {
            return Ok(LoginOutcome::SignedIn);
        }
    }
}

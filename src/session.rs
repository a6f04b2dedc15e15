//! Session store: where the current sign-in lives and what proves it.
//!
//! SYSTEM CONTEXT
//! ==============
//! Page gates ask [`SessionStore::is_authenticated`], the content client asks
//! [`SessionStore::auth_header`], and the flow controller and redirect
//! callback are the only writers (`save_session`). Sign-out is the only
//! deleter (`clear_session`).
//!
//! DESIGN
//! ======
//! Two strategies satisfy the same contract; a deployment picks one:
//! - [`LocalSessionStore`] keeps `{accessToken, idToken, expiresAt}` itself
//!   under [`SESSION_KEY`] and computes expiry locally.
//! - [`ProviderSessionStore`] asks the identity provider's own token cache
//!   and trusts its expiry and refresh handling.
//!
//! Expiry is checked lazily on read. A session is valid while
//! `now < expiresAt`; at exactly `expiresAt` it is gone.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::identity::{AuthError, IdentityProvider};
use crate::storage::{KeyValueStorage, StorageError, load_json, save_json};

/// Storage key holding the self-managed session record.
pub const SESSION_KEY: &str = "blog_auth_tokens";

const BEARER_PREFIX: &str = "Bearer ";

/// Tokens as issued: relative lifetime in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub expires_in: u64,
}

/// Persisted session record with an absolute expiry in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub id_token: String,
    pub expires_at: i64,
}

impl Session {
    #[must_use]
    pub fn from_tokens(tokens: &TokenSet, now_ms: i64) -> Self {
        let lifetime_ms = i64::try_from(tokens.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Self {
            access_token: tokens.access_token.clone(),
            id_token: tokens.id_token.clone(),
            expires_at: now_ms.saturating_add(lifetime_ms),
        }
    }

    #[must_use]
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }

    #[must_use]
    pub fn auth_header(&self) -> String {
        bearer(&self.id_token)
    }
}

/// `Authorization` header value for an id token.
#[must_use]
pub fn bearer(id_token: &str) -> String {
    format!("{BEARER_PREFIX}{id_token}")
}

// =============================================================================
// CLOCK
// =============================================================================

/// Wall-clock source in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    }
}

// =============================================================================
// STORE CONTRACT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("sign-out failed: {0}")]
    SignOut(AuthError),
}

/// The four-operation session contract shared by both strategies.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// True iff an unexpired session exists. Never fails: absent or
    /// corrupt state reads as signed out.
    async fn is_authenticated(&self) -> bool {
        self.auth_header().await.is_some()
    }

    /// `"Bearer <idToken>"` for a valid session. `None` means the caller
    /// must not attempt the protected call.
    async fn auth_header(&self) -> Option<String>;

    /// Persist freshly issued tokens as the current session.
    async fn save_session(&self, tokens: &TokenSet) -> Result<(), SessionError>;

    /// Drop the current session. Clearing an absent session succeeds.
    async fn clear_session(&self) -> Result<(), SessionError>;
}

// =============================================================================
// SELF-MANAGED
// =============================================================================

/// Strategy (a): the session triple lives in [`KeyValueStorage`].
pub struct LocalSessionStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
}

impl LocalSessionStore {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// The stored session if it is still valid.
    ///
    /// An expired record is removed on the way out.
    #[must_use]
    pub fn current(&self) -> Option<Session> {
        let session: Session = load_json(&*self.storage, SESSION_KEY)?;
        if session.is_valid_at(self.clock.now_ms()) {
            return Some(session);
        }
        tracing::debug!(expires_at = session.expires_at, "stored session expired");
        if let Err(e) = self.storage.remove_item(SESSION_KEY) {
            tracing::warn!(error = %e, "failed to remove expired session");
        }
        None
    }

    /// Write `tokens` as the current session and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage backend rejects the write.
    pub fn write(&self, tokens: &TokenSet) -> Result<Session, SessionError> {
        let session = Session::from_tokens(tokens, self.clock.now_ms());
        save_json(&*self.storage, SESSION_KEY, &session)?;
        tracing::info!(expires_at = session.expires_at, "session saved");
        Ok(session)
    }

    /// Remove the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the storage backend rejects the removal.
    pub fn remove(&self) -> Result<(), SessionError> {
        self.storage.remove_item(SESSION_KEY)?;
        tracing::info!("session cleared");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for LocalSessionStore {
    async fn auth_header(&self) -> Option<String> {
        self.current().map(|s| s.auth_header())
    }

    async fn save_session(&self, tokens: &TokenSet) -> Result<(), SessionError> {
        self.write(tokens).map(|_| ())
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        self.remove()
    }
}

// =============================================================================
// PROVIDER-MANAGED
// =============================================================================

/// Strategy (b): the identity provider's own token cache is the store.
pub struct ProviderSessionStore<P: ?Sized> {
    provider: Arc<P>,
}

impl<P: IdentityProvider + ?Sized> ProviderSessionStore<P> {
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P: IdentityProvider + ?Sized> SessionStore for ProviderSessionStore<P> {
    async fn auth_header(&self) -> Option<String> {
        match self.provider.fetch_current_session().await {
            Ok(Some(tokens)) => Some(bearer(&tokens.id_token)),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(error = %e, "provider session lookup failed");
                None
            }
        }
    }

    async fn save_session(&self, _tokens: &TokenSet) -> Result<(), SessionError> {
        // The provider cached these when it issued them.
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        self.provider.sign_out().await.map_err(SessionError::SignOut)
    }
}

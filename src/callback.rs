//! Redirect callback for the hosted login page (self-managed strategy).
//!
//! The hosted page sends the browser to `<origin>/admin/callback` with the
//! issued tokens in the URL fragment:
//!
//! ```text
//! /admin/callback#access_token=...&id_token=...&expires_in=3600&token_type=Bearer
//! ```
//!
//! [`complete_redirect`] stores them and hands back the address with the
//! fragment removed, so tokens never linger in history or logs.

#[cfg(test)]
#[path = "callback_test.rs"]
mod tests;

use url::Url;

use crate::session::{SessionStore, TokenSet};

/// Which view follows the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackView {
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub view: CallbackView,
    /// The callback address with its fragment stripped.
    pub location: Url,
}

/// Parse a redirect fragment into a token set.
///
/// A leading `#` is tolerated. All three of `access_token`, `id_token`, and
/// `expires_in` must be present, the tokens non-empty, and `expires_in` a
/// non-negative integer. The first occurrence of a repeated key wins.
#[must_use]
pub fn parse_fragment(fragment: &str) -> Option<TokenSet> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let mut access_token = None;
    let mut id_token = None;
    let mut expires_in = None;
    for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
        let slot = match key.as_ref() {
            "access_token" => &mut access_token,
            "id_token" => &mut id_token,
            "expires_in" => &mut expires_in,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    let access_token = access_token.filter(|t| !t.is_empty())?;
    let id_token = id_token.filter(|t| !t.is_empty())?;
    match expires_in?.trim().parse::<u64>() {
        Ok(expires_in) => Some(TokenSet { access_token, id_token, expires_in }),
        Err(_) => None,
    }
}

/// Token set carried by a full callback URL, if any.
#[must_use]
pub fn parse_location(location: &Url) -> Option<TokenSet> {
    location.fragment().and_then(parse_fragment)
}

/// `location` without its fragment.
#[must_use]
pub fn scrub_fragment(location: &Url) -> Url {
    let mut scrubbed = location.clone();
    scrubbed.set_fragment(None);
    scrubbed
}

/// Save any tokens carried by `location` and decide which view follows.
///
/// Never fails: a missing or malformed fragment, or a store that rejects
/// the write, leads to the unauthenticated view. Processing the same URL
/// twice saves the same tokens twice.
pub async fn complete_redirect(location: &Url, store: &dyn SessionStore) -> CallbackOutcome {
    let scrubbed = scrub_fragment(location);
    let Some(tokens) = parse_location(location) else {
        tracing::info!(path = scrubbed.path(), "callback carried no usable tokens");
        return CallbackOutcome { view: CallbackView::Unauthenticated, location: scrubbed };
    };

    let view = match store.save_session(&tokens).await {
        Ok(()) => {
            tracing::info!(expires_in = tokens.expires_in, "session established from redirect");
            CallbackView::Authenticated
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to save redirect session");
            CallbackView::Unauthenticated
        }
    };
    CallbackOutcome { view, location: scrubbed }
}

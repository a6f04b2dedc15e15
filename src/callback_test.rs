use super::*;
use crate::session::{LocalSessionStore, SessionError};
use crate::storage::{MemoryStorage, StorageError};
use std::sync::Arc;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

// =============================================================================
// parse_fragment
// =============================================================================

#[test]
fn full_fragment_parses() {
    let tokens = parse_fragment("#access_token=A&id_token=I&expires_in=3600&token_type=Bearer").unwrap();
    assert_eq!(tokens, TokenSet { access_token: "A".into(), id_token: "I".into(), expires_in: 3600 });
}

#[test]
fn leading_hash_is_optional() {
    assert!(parse_fragment("access_token=A&id_token=I&expires_in=1").is_some());
}

#[test]
fn missing_any_key_is_none() {
    assert_eq!(parse_fragment("access_token=A&id_token=I"), None);
    assert_eq!(parse_fragment("access_token=A&expires_in=10"), None);
    assert_eq!(parse_fragment("id_token=I&expires_in=10"), None);
    assert_eq!(parse_fragment(""), None);
    assert_eq!(parse_fragment("#"), None);
}

#[test]
fn non_numeric_expiry_is_none() {
    assert_eq!(parse_fragment("access_token=A&id_token=I&expires_in=soon"), None);
    assert_eq!(parse_fragment("access_token=A&id_token=I&expires_in=-5"), None);
    assert_eq!(parse_fragment("access_token=A&id_token=I&expires_in=1.5"), None);
}

#[test]
fn empty_tokens_are_none() {
    assert_eq!(parse_fragment("access_token=&id_token=I&expires_in=10"), None);
    assert_eq!(parse_fragment("access_token=A&id_token=&expires_in=10"), None);
}

#[test]
fn values_are_percent_decoded() {
    let tokens = parse_fragment("access_token=a%2Eb%3D&id_token=x.y.z&expires_in=60").unwrap();
    assert_eq!(tokens.access_token, "a.b=");
}

#[test]
fn first_occurrence_wins() {
    let tokens = parse_fragment("id_token=first&id_token=second&access_token=A&expires_in=5").unwrap();
    assert_eq!(tokens.id_token, "first");
}

#[test]
fn error_redirect_is_none() {
    assert_eq!(parse_fragment("error=access_denied&error_description=nope"), None);
}

// =============================================================================
// complete_redirect
// =============================================================================

#[test]
fn scrub_removes_only_fragment() {
    let scrubbed = scrub_fragment(&url("http://localhost:5173/admin/callback?x=1#access_token=A"));
    assert_eq!(scrubbed.as_str(), "http://localhost:5173/admin/callback?x=1");
}

#[tokio::test]
async fn redirect_with_tokens_saves_session() {
    let store = LocalSessionStore::new(Arc::new(MemoryStorage::new()));
    let location = url("http://localhost:5173/admin/callback#access_token=A&id_token=I&expires_in=3600");

    let outcome = complete_redirect(&location, &store).await;

    assert_eq!(outcome.view, CallbackView::Authenticated);
    assert_eq!(outcome.location.as_str(), "http://localhost:5173/admin/callback");
    assert_eq!(store.auth_header().await.as_deref(), Some("Bearer I"));
}

#[tokio::test]
async fn redirect_without_tokens_is_unauthenticated() {
    let store = LocalSessionStore::new(Arc::new(MemoryStorage::new()));
    let location = url("http://localhost:5173/admin/callback#error=access_denied");

    let outcome = complete_redirect(&location, &store).await;

    assert_eq!(outcome.view, CallbackView::Unauthenticated);
    assert_eq!(outcome.location.fragment(), None);
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn redirect_processed_twice_is_harmless() {
    let store = LocalSessionStore::new(Arc::new(MemoryStorage::new()));
    let location = url("http://localhost:5173/admin/callback#access_token=A&id_token=I&expires_in=60");

    let first = complete_redirect(&location, &store).await;
    let second = complete_redirect(&location, &store).await;

    assert_eq!(first, second);
    assert_eq!(store.auth_header().await.as_deref(), Some("Bearer I"));
}

struct RejectingStore;

#[async_trait::async_trait]
impl SessionStore for RejectingStore {
    async fn auth_header(&self) -> Option<String> {
        None
    }

    async fn save_session(&self, _tokens: &TokenSet) -> Result<(), SessionError> {
        Err(SessionError::Storage(StorageError::InvalidKey("blog_auth_tokens".into())))
    }

    async fn clear_session(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

#[tokio::test]
async fn store_failure_falls_back_to_unauthenticated() {
    let location = url("http://localhost:5173/admin/callback#access_token=A&id_token=I&expires_in=60");
    let outcome = complete_redirect(&location, &RejectingStore).await;
    assert_eq!(outcome.view, CallbackView::Unauthenticated);
    assert_eq!(outcome.location.fragment(), None);
}

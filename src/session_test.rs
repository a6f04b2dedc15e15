use super::*;
use crate::storage::MemoryStorage;
use crate::test_helpers::{ManualClock, MockProvider, issued_tokens};

const T0: i64 = 1_700_000_000_000;

fn local_store() -> (LocalSessionStore, Arc<MemoryStorage>, Arc<ManualClock>) {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new(T0));
    let store = LocalSessionStore::with_clock(storage.clone(), clock.clone());
    (store, storage, clock)
}

fn tokens(id: &str, expires_in: u64) -> TokenSet {
    TokenSet { access_token: format!("access-{id}"), id_token: id.to_owned(), expires_in }
}

// =============================================================================
// Session record
// =============================================================================

#[test]
fn session_expiry_is_now_plus_lifetime_in_ms() {
    let session = Session::from_tokens(&tokens("i", 3600), T0);
    assert_eq!(session.expires_at, T0 + 3_600_000);
}

#[test]
fn session_is_invalid_exactly_at_expiry() {
    let session = Session::from_tokens(&tokens("i", 10), T0);
    assert!(session.is_valid_at(T0 + 9_999));
    assert!(!session.is_valid_at(T0 + 10_000));
}

#[test]
fn session_huge_lifetime_saturates() {
    let session = Session::from_tokens(&tokens("i", u64::MAX), T0);
    assert_eq!(session.expires_at, i64::MAX);
}

#[test]
fn session_serializes_with_camel_case_keys() {
    let session = Session { access_token: "a".into(), id_token: "b".into(), expires_at: 5 };
    let json = serde_json::to_value(&session).unwrap();
    assert_eq!(json, serde_json::json!({ "accessToken": "a", "idToken": "b", "expiresAt": 5 }));
}

#[test]
fn bearer_prefixes_token() {
    assert_eq!(bearer("xyz"), "Bearer xyz");
}

// =============================================================================
// LocalSessionStore
// =============================================================================

#[tokio::test]
async fn saved_session_is_authenticated_with_bearer_header() {
    let (store, _, _) = local_store();
    for expires_in in [1, 60, 3600, 86_400 * 30] {
        store.save_session(&tokens("id-token", expires_in)).await.unwrap();
        assert!(store.is_authenticated().await, "expires_in {expires_in}");
        assert_eq!(store.auth_header().await.as_deref(), Some("Bearer id-token"));
    }
}

#[tokio::test]
async fn session_expires_without_explicit_clear() {
    let (store, storage, clock) = local_store();
    store.save_session(&tokens("i", 60)).await.unwrap();

    clock.advance_secs(59);
    assert!(store.is_authenticated().await);

    clock.advance_secs(1);
    assert!(!store.is_authenticated().await);
    assert_eq!(store.auth_header().await, None);
    // Expiry detection removes the stale record.
    assert_eq!(storage.get_item(SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn clear_session_signs_out() {
    let (store, _, _) = local_store();
    store.save_session(&issued_tokens()).await.unwrap();
    store.clear_session().await.unwrap();
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn clear_session_without_session_is_ok() {
    let (store, _, _) = local_store();
    store.clear_session().await.unwrap();
    store.clear_session().await.unwrap();
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn corrupt_record_reads_as_signed_out() {
    let (store, storage, _) = local_store();
    storage.set_item(SESSION_KEY, "{\"accessToken\":").unwrap();
    assert!(!store.is_authenticated().await);
    assert_eq!(store.auth_header().await, None);
}

#[tokio::test]
async fn record_layout_matches_persisted_shape() {
    let (store, storage, _) = local_store();
    store.save_session(&tokens("id-x", 100)).await.unwrap();
    let raw = storage.get_item(SESSION_KEY).unwrap().unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["accessToken"], "access-id-x");
    assert_eq!(json["idToken"], "id-x");
    assert_eq!(json["expiresAt"], T0 + 100_000);
}

#[tokio::test]
async fn record_written_by_another_writer_is_honored() {
    let (store, storage, _) = local_store();
    let raw = serde_json::json!({ "accessToken": "a", "idToken": "from-elsewhere", "expiresAt": T0 + 1 });
    storage.set_item(SESSION_KEY, &raw.to_string()).unwrap();
    assert_eq!(store.auth_header().await.as_deref(), Some("Bearer from-elsewhere"));
}

#[tokio::test]
async fn save_replaces_previous_session() {
    let (store, _, _) = local_store();
    store.save_session(&tokens("first", 100)).await.unwrap();
    store.save_session(&tokens("second", 100)).await.unwrap();
    assert_eq!(store.auth_header().await.as_deref(), Some("Bearer second"));
}

#[tokio::test]
async fn zero_lifetime_is_immediately_expired() {
    let (store, _, _) = local_store();
    store.save_session(&tokens("i", 0)).await.unwrap();
    assert!(!store.is_authenticated().await);
}

// =============================================================================
// ProviderSessionStore
// =============================================================================

#[tokio::test]
async fn provider_store_reads_provider_tokens() {
    let provider = Arc::new(MockProvider::new().signed_in());
    let store = ProviderSessionStore::new(provider.clone());
    assert!(store.is_authenticated().await);
    assert_eq!(store.auth_header().await.as_deref(), Some("Bearer id-1"));
}

#[tokio::test]
async fn provider_store_without_tokens_is_signed_out() {
    let store = ProviderSessionStore::new(Arc::new(MockProvider::new()));
    assert!(!store.is_authenticated().await);
    assert_eq!(store.auth_header().await, None);
}

#[tokio::test]
async fn provider_store_save_is_a_no_op() {
    let provider = Arc::new(MockProvider::new());
    let store = ProviderSessionStore::new(provider.clone());
    store.save_session(&issued_tokens()).await.unwrap();
    assert!(!store.is_authenticated().await);
    assert_eq!(provider.count("sign_in"), 0);
}

#[tokio::test]
async fn provider_store_clear_signs_out_at_provider() {
    let provider = Arc::new(MockProvider::new().signed_in());
    let store = ProviderSessionStore::new(provider.clone());
    store.clear_session().await.unwrap();
    assert_eq!(provider.count("sign_out"), 1);
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn stores_are_interchangeable_behind_trait_object() {
    let provider = Arc::new(MockProvider::new().signed_in());
    let (local, _, _) = local_store();
    local.save_session(&issued_tokens()).await.unwrap();
    let stores: Vec<Arc<dyn SessionStore>> = vec![Arc::new(local), Arc::new(ProviderSessionStore::new(provider))];
    for store in stores {
        assert_eq!(store.auth_header().await.as_deref(), Some("Bearer id-1"));
    }
}

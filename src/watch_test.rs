use super::*;
use crate::session::{LocalSessionStore, TokenSet};
use crate::storage::{KeyValueStorage, MemoryStorage};
use crate::test_helpers::ManualClock;

fn store() -> (Arc<LocalSessionStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(LocalSessionStore::with_clock(Arc::new(MemoryStorage::new()), clock.clone()));
    (store, clock)
}

fn tokens(expires_in: u64) -> TokenSet {
    TokenSet { access_token: "a".into(), id_token: "i".into(), expires_in }
}

#[tokio::test(start_paused = true)]
async fn initial_value_reflects_store() {
    let (store, _) = store();
    store.save_session(&tokens(60)).await.unwrap();

    let watch = AuthWatch::spawn(store, DEFAULT_POLL_INTERVAL).await;
    assert!(watch.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn expiry_is_published() {
    let (store, clock) = store();
    store.save_session(&tokens(10)).await.unwrap();
    let watch = AuthWatch::spawn(store, DEFAULT_POLL_INTERVAL).await;
    let mut rx = watch.subscribe();

    clock.advance_secs(10);
    rx.changed().await.unwrap();

    assert!(!*rx.borrow_and_update());
    assert!(!watch.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn sign_in_elsewhere_is_published() {
    let (store, _) = store();
    let watch = AuthWatch::spawn(store.clone(), Duration::from_secs(1)).await;
    let mut rx = watch.subscribe();
    assert!(!*rx.borrow_and_update());

    store.save_session(&tokens(3600)).await.unwrap();
    rx.changed().await.unwrap();
    assert!(*rx.borrow_and_update());
}

#[tokio::test(start_paused = true)]
async fn unchanged_state_is_not_republished() {
    let (store, _) = store();
    store.save_session(&tokens(3600)).await.unwrap();
    let watch = AuthWatch::spawn(store, Duration::from_secs(1)).await;
    let rx = watch.subscribe();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn watcher_never_writes_the_store() {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::new(0));
    let store = Arc::new(LocalSessionStore::with_clock(storage.clone(), clock.clone()));
    store.save_session(&tokens(3600)).await.unwrap();
    let before = storage.get_item(crate::session::SESSION_KEY).unwrap();

    let _watch = AuthWatch::spawn(store, Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(storage.get_item(crate::session::SESSION_KEY).unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn stop_ends_polling() {
    let (store, _) = store();
    let watch = AuthWatch::spawn(store, Duration::from_secs(1)).await;
    let mut rx = watch.subscribe();

    watch.stop();
    assert!(rx.changed().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn zero_interval_still_polls() {
    let (store, _) = store();
    let watch = AuthWatch::spawn(store.clone(), Duration::ZERO).await;
    let mut rx = watch.subscribe();
    assert!(!*rx.borrow_and_update());

    store.save_session(&tokens(3600)).await.unwrap();
    rx.changed().await.unwrap();

    assert!(*rx.borrow_and_update());
    assert!(!watch.task.is_finished());
}

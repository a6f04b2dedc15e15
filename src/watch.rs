//! Auth-status watcher.
//!
//! Polls [`SessionStore::is_authenticated`] on a fixed interval and
//! publishes the flag on a `tokio::sync::watch` channel, so headers and
//! status lines notice expiry or sign-out that happened elsewhere. Strictly
//! read-only: it never writes the store and never touches a flow.

#[cfg(test)]
#[path = "watch_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::session::SessionStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest accepted poll period; shorter requests are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Running poller. Dropping it stops the task.
pub struct AuthWatch {
    rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl AuthWatch {
    /// Read the current state once, then poll every `interval`.
    ///
    /// An interval below [`MIN_POLL_INTERVAL`] is raised to it.
    pub async fn spawn(store: Arc<dyn SessionStore>, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(?interval, "auth watch interval too short, using minimum");
        }
        let interval = interval.max(MIN_POLL_INTERVAL);
        let initial = store.is_authenticated().await;
        let (tx, rx) = watch::channel(initial);
        let task = tokio::spawn(poll(store, interval, tx));
        tracing::debug!(authenticated = initial, ?interval, "auth watch started");
        Self { rx, task }
    }

    /// A receiver that sees every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        *self.rx.borrow()
    }

    /// Stop polling.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for AuthWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll(store: Arc<dyn SessionStore>, interval: Duration, tx: watch::Sender<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the initial value is already published.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let authenticated = store.is_authenticated().await;
        let changed = tx.send_if_modified(|current| {
            if *current == authenticated {
                return false;
            }
            *current = authenticated;
            true
        });
        if changed {
            tracing::info!(authenticated, "auth status changed");
        }
        if tx.is_closed() {
            tracing::debug!("auth watch has no subscribers left");
            return;
        }
    }
}

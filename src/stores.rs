// SPDX-License-Identifier: MIT

//! Watch-channel pub-sub stores for externally owned state.
//!
//! The session and alert stores are owned by the host application; the
//! controller only reads and subscribes. `Store` keeps the channel sender
//! alive so late subscribers always observe the latest snapshot.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{AlertState, SessionState};

/// A small single-value pub-sub store.
#[derive(Debug, Clone)]
pub struct Store<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T: Clone + Send + Sync + 'static> Store<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Subscribe for change notifications.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Session identity published by the auth layer.
pub type SessionStore = Store<SessionState>;

/// Alerting users published by the alert feed.
pub type AlertStore = Store<AlertState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_updates() {
        let store = SessionStore::default();
        let mut rx = store.subscribe();

        store.set(SessionState {
            user_id: Some("u1".to_string()),
        });

        rx.changed().await.expect("sender alive");
        assert_eq!(rx.borrow().user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_latest_snapshot() {
        let store = SessionStore::default();
        store.set(SessionState {
            user_id: Some("u2".to_string()),
        });

        let rx = store.subscribe();
        assert_eq!(rx.borrow().user_id.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_update_mutates_in_place() {
        let store = AlertStore::default();
        store.update(|state| {
            state.alerting.push(crate::models::Alert {
                id: 7,
                user_id: "u1".to_string(),
                open: true,
                created_at: chrono::Utc::now(),
            });
        });
        assert!(store.get().has_open_alert("u1"));
    }
}

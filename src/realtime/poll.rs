use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::app::{KeepsakeError, Result};
use crate::domain::PropertyId;
use crate::realtime::{
    ChangeEvent, ChangeFilter, ChangeKind, RealtimeChannel, Subscription, SubscriptionHandle,
    EVENT_BUFFER,
};
use crate::store::FavoriteStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Change feed for backends without push support: snapshots the user's
/// favorites on an interval and emits an event whenever the snapshot moves.
pub struct PollingChannel {
    store: Arc<dyn FavoriteStore + Send + Sync>,
    period: Duration,
    next_id: AtomicU64,
    pollers: Mutex<HashMap<SubscriptionHandle, JoinHandle<()>>>,
}

impl PollingChannel {
    pub fn new(store: Arc<dyn FavoriteStore + Send + Sync>) -> Self {
        Self::with_interval(store, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(store: Arc<dyn FavoriteStore + Send + Sync>, period: Duration) -> Self {
        Self {
            store,
            period,
            next_id: AtomicU64::new(0),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    pub fn poller_count(&self) -> usize {
        self.pollers.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Drop for PollingChannel {
    fn drop(&mut self) {
        if let Ok(mut pollers) = self.pollers.lock() {
            for (_, task) in pollers.drain() {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl RealtimeChannel for PollingChannel {
    async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription> {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, events) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(poll_loop(self.store.clone(), self.period, filter, tx));
        let mut pollers = self
            .pollers
            .lock()
            .map_err(|e| KeepsakeError::Other(e.to_string()))?;
        // Pollers whose receiver was dropped without unsubscribing.
        pollers.retain(|_, t| !t.is_finished());
        pollers.insert(handle, task);
        drop(pollers);

        Ok(Subscription { handle, events })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Ok(mut pollers) = self.pollers.lock() {
            if let Some(task) = pollers.remove(&handle) {
                task.abort();
                debug!(subscription = handle.0, "poller stopped");
            }
        }
    }
}

async fn poll_loop(
    store: Arc<dyn FavoriteStore + Send + Sync>,
    period: Duration,
    filter: ChangeFilter,
    tx: mpsc::Sender<ChangeEvent>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut previous: Option<HashSet<PropertyId>> = None;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let current: HashSet<PropertyId> = match store.property_ids(&filter.user_id).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("Favorites poll failed: {}", e);
                continue;
            }
        };

        if let Some(prev) = &previous {
            let added: Vec<_> = current.difference(prev).cloned().collect();
            let removed: Vec<_> = prev.difference(&current).cloned().collect();

            for (kind, ids) in [(ChangeKind::Insert, added), (ChangeKind::Delete, removed)] {
                if ids.is_empty() {
                    continue;
                }
                let payload = serde_json::json!({ "property_ids": ids });
                let event = ChangeEvent {
                    kind,
                    table: filter.table.clone(),
                    user_id: filter.user_id.clone(),
                    payload,
                };
                // Full means a resync is already pending.
                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(event) {
                    return;
                }
            }
        }

        previous = Some(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewFavorite;
    use crate::store::SqliteStore;

    #[tokio::test]
    async fn test_emits_insert_then_delete() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let channel = PollingChannel::with_interval(store.clone(), Duration::from_millis(20));
        let mut sub = channel
            .subscribe(ChangeFilter::favorites("alice".into()))
            .await
            .unwrap();

        // Let the baseline snapshot land first.
        tokio::time::sleep(Duration::from_millis(60)).await;
        store
            .insert(&NewFavorite::new("alice".into(), "p1".into()))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), sub.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);

        store
            .delete_by_keys(&"alice".into(), &"p1".into())
            .await
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), sub.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);

        channel.unsubscribe(sub.handle);
        channel.unsubscribe(sub.handle);
    }

    #[tokio::test]
    async fn test_other_users_changes_are_invisible() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let channel = PollingChannel::with_interval(store.clone(), Duration::from_millis(20));
        let mut sub = channel
            .subscribe(ChangeFilter::favorites("alice".into()))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        store
            .insert(&NewFavorite::new("bob".into(), "p1".into()))
            .await
            .unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(150), sub.events.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_abandoned_poller_is_pruned() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let channel = PollingChannel::with_interval(store, Duration::from_millis(20));

        let abandoned = channel
            .subscribe(ChangeFilter::favorites("alice".into()))
            .await
            .unwrap();
        drop(abandoned);
        // A couple of ticks for the loop to see the closed receiver.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let kept = channel
            .subscribe(ChangeFilter::favorites("alice".into()))
            .await
            .unwrap();
        assert_eq!(channel.poller_count(), 1);

        channel.unsubscribe(kept.handle);
        assert_eq!(channel.poller_count(), 0);
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::app::{KeepsakeError, Result};
use crate::realtime::{
    ChangeEvent, ChangeFilter, RealtimeChannel, Subscription, SubscriptionHandle, EVENT_BUFFER,
};

struct Subscriber {
    filter: ChangeFilter,
    tx: mpsc::Sender<ChangeEvent>,
}

/// In-process fan-out of change events to filtered subscribers.
#[derive(Default)]
pub struct RealtimeHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionHandle, Subscriber>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every matching subscriber. Returns how many
    /// subscribers received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|handle, sub| {
            if !sub.filter.matches(&event) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    trace!(subscription = handle.0, "event queue full, dropping");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscription = handle.0, "pruning closed subscription");
                    false
                }
            }
        });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RealtimeChannel for RealtimeHub {
    async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription> {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, events) = mpsc::channel(EVENT_BUFFER);

        self.subscribers
            .lock()
            .map_err(|e| KeepsakeError::Other(e.to_string()))?
            .insert(handle, Subscriber { filter, tx });

        debug!(subscription = handle.0, "realtime subscription opened");
        Ok(Subscription { handle, events })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            if subscribers.remove(&handle).is_some() {
                debug!(subscription = handle.0, "realtime subscription released");
            }
        }
    }
}

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::{KeepsakeError, Result};
use crate::domain::UserId;
use crate::realtime::{ChangeEvent, RealtimeChannel, Subscription, SubscriptionHandle};

/// Liveness flag plus a monotonically increasing request token.
#[derive(Debug)]
pub(crate) struct Liveness {
    active: AtomicBool,
    latest: AtomicU64,
}

impl Liveness {
    pub(crate) fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            latest: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns true only for the first call.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn next_token(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn is_current(&self, token: u64) -> bool {
        self.latest.load(Ordering::Acquire) == token
    }
}

/// Something that resyncs from the server when told its data changed.
#[async_trait]
pub(crate) trait Invalidate: Send + Sync {
    async fn invalidate(&self, user_id: &UserId);
}

/// A held realtime subscription and the task draining it.
#[derive(Default)]
pub(crate) struct LiveFeed {
    inner: Mutex<Option<(SubscriptionHandle, JoinHandle<()>)>>,
}

impl LiveFeed {
    pub(crate) fn is_attached(&self) -> bool {
        self.inner.lock().map(|f| f.is_some()).unwrap_or(false)
    }

    /// Start draining `subscription` into `target`. Returns the
    /// subscription back if one is already attached.
    pub(crate) fn attach<T: Invalidate + 'static>(
        &self,
        subscription: Subscription,
        target: Weak<T>,
        user_id: UserId,
    ) -> std::result::Result<(), SubscriptionHandle> {
        let Ok(mut slot) = self.inner.lock() else {
            return Err(subscription.handle);
        };
        if slot.is_some() {
            return Err(subscription.handle);
        }

        let listener = spawn_listener(target, user_id, subscription.events);
        *slot = Some((subscription.handle, listener));
        Ok(())
    }

    /// Release the subscription if held. Safe to call any number of times.
    pub(crate) fn release(&self, realtime: &(dyn RealtimeChannel + Send + Sync)) {
        let taken = self.inner.lock().ok().and_then(|mut slot| slot.take());
        if let Some((handle, listener)) = taken {
            listener.abort();
            realtime.unsubscribe(handle);
        }
    }
}

fn spawn_listener<T: Invalidate + 'static>(
    target: Weak<T>,
    user_id: UserId,
    mut events: mpsc::Receiver<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let mut coalesced = 0;
            while events.try_recv().is_ok() {
                coalesced += 1;
            }

            let Some(target) = target.upgrade() else {
                break;
            };
            debug!(kind = ?event.kind, coalesced, user = %user_id, "favorites changed, resyncing");
            target.invalidate(&user_id).await;
        }
    })
}

/// Bound a backend call by `limit`.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| KeepsakeError::Timeout(limit))?
}

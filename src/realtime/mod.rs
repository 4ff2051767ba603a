pub mod hub;
pub mod poll;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::app::Result;
use crate::domain::UserId;

pub use hub::RealtimeHub;
pub use poll::PollingChannel;

/// Queue depth per subscriber. A full queue already guarantees a resync,
/// so further events are dropped.
pub const EVENT_BUFFER: usize = 16;

pub const FAVORITES_TABLE: &str = "favorites";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// A change notification. Consumers treat it as "something changed";
/// the payload is informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub user_id: UserId,
    pub payload: serde_json::Value,
}

impl ChangeEvent {
    pub fn favorites(kind: ChangeKind, user_id: UserId, payload: serde_json::Value) -> Self {
        Self {
            kind,
            table: FAVORITES_TABLE.to_string(),
            user_id,
            payload,
        }
    }
}

/// Which rows a subscription covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: String,
    pub user_id: UserId,
}

impl ChangeFilter {
    pub fn favorites(user_id: UserId) -> Self {
        Self {
            table: FAVORITES_TABLE.to_string(),
            user_id,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table == event.table && self.user_id == event.user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::Receiver<ChangeEvent>,
}

#[async_trait]
pub trait RealtimeChannel {
    async fn subscribe(&self, filter: ChangeFilter) -> Result<Subscription>;

    /// Releasing an unknown or already released handle is a no-op.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

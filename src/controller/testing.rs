//! A scriptable store for ordering and failure tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;

use crate::app::{KeepsakeError, Result};
use crate::controller::Services;
use crate::domain::{FavoriteRecord, NewFavorite, PropertyId, RecordId, UserId};
use crate::notify::MemoryNotifier;
use crate::realtime::RealtimeHub;
use crate::store::FavoriteStore;

pub(crate) const PROPERTY_IDS: &str = "property_ids";
pub(crate) const FIND: &str = "find";
pub(crate) const INSERT: &str = "insert";
pub(crate) const DELETE: &str = "delete";

/// In-memory store whose calls can be held open or failed on demand.
/// Reads snapshot their answer when called, before waiting on a gate.
#[derive(Default)]
pub(crate) struct ScriptedStore {
    rows: Mutex<Vec<FavoriteRecord>>,
    next_id: AtomicU64,
    calls: Mutex<HashMap<&'static str, usize>>,
    gates: Mutex<HashMap<&'static str, VecDeque<oneshot::Receiver<()>>>>,
    failures: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a row directly, as another client would.
    pub(crate) fn seed(&self, user: &str, property: &str) -> RecordId {
        let id = RecordId::new(format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1));
        self.rows.lock().unwrap().push(FavoriteRecord {
            id: id.clone(),
            user_id: user.into(),
            property_id: property.into(),
            created_at: Some(Utc::now()),
        });
        id
    }

    /// Remove a row directly, without any realtime event.
    pub(crate) fn remove(&self, user: &str, property: &str) {
        self.rows
            .lock()
            .unwrap()
            .retain(|r| !(r.user_id.as_str() == user && r.property_id.as_str() == property));
    }

    pub(crate) fn row_count(&self, user: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id.as_str() == user)
            .count()
    }

    /// The next call of `op` waits until the returned sender fires or drops.
    pub(crate) fn gate(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(rx);
        tx
    }

    /// The next `times` calls of `op` fail with a network error.
    pub(crate) fn fail(&self, op: &'static str, times: usize) {
        self.failures.lock().unwrap().insert(op, times);
    }

    pub(crate) fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Count the call and hand back its gate, or the scripted failure.
    fn enter(&self, op: &'static str) -> Result<Option<oneshot::Receiver<()>>> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let mut failures = self.failures.lock().unwrap();
        if let Some(left) = failures.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(KeepsakeError::Network(format!("{} failed", op)));
            }
        }

        Ok(self
            .gates
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|q| q.pop_front()))
    }
}

async fn pass(gate: Option<oneshot::Receiver<()>>) {
    if let Some(gate) = gate {
        let _ = gate.await;
    }
}

#[async_trait]
impl FavoriteStore for ScriptedStore {
    async fn insert(&self, favorite: &NewFavorite) -> Result<FavoriteRecord> {
        pass(self.enter(INSERT)?).await;

        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.user_id == favorite.user_id && r.property_id == favorite.property_id)
        {
            return Err(KeepsakeError::Conflict {
                property_id: favorite.property_id.to_string(),
            });
        }
        let record = FavoriteRecord {
            id: RecordId::new(format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)),
            user_id: favorite.user_id.clone(),
            property_id: favorite.property_id.clone(),
            created_at: Some(Utc::now()),
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn delete_by_id(&self, user_id: &UserId, id: &RecordId) -> Result<()> {
        pass(self.enter(DELETE)?).await;
        self.rows
            .lock()
            .unwrap()
            .retain(|r| !(&r.user_id == user_id && &r.id == id));
        Ok(())
    }

    async fn delete_by_keys(&self, user_id: &UserId, property_id: &PropertyId) -> Result<()> {
        pass(self.enter(DELETE)?).await;
        self.rows
            .lock()
            .unwrap()
            .retain(|r| !(&r.user_id == user_id && &r.property_id == property_id));
        Ok(())
    }

    async fn find(
        &self,
        user_id: &UserId,
        property_id: &PropertyId,
    ) -> Result<Option<FavoriteRecord>> {
        let gate = self.enter(FIND)?;
        let found = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.user_id == user_id && &r.property_id == property_id)
            .cloned();
        pass(gate).await;
        Ok(found)
    }

    async fn property_ids(&self, user_id: &UserId) -> Result<Vec<PropertyId>> {
        let gate = self.enter(PROPERTY_IDS)?;
        let ids: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.user_id == user_id)
            .map(|r| r.property_id.clone())
            .collect();
        pass(gate).await;
        Ok(ids)
    }

    async fn list(&self, user_id: &UserId) -> Result<Vec<FavoriteRecord>> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.user_id == user_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

pub(crate) struct Harness {
    pub store: Arc<ScriptedStore>,
    pub hub: Arc<RealtimeHub>,
    pub notifier: Arc<MemoryNotifier>,
    pub services: Services,
}

pub(crate) fn harness() -> Harness {
    let store = ScriptedStore::new();
    let hub = Arc::new(RealtimeHub::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let services = Services::new(store.clone(), hub.clone(), notifier.clone())
        .with_request_timeout(Duration::from_secs(2));

    Harness {
        store,
        hub,
        notifier,
        services,
    }
}

/// Yield until `cond` holds; panics after a second.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

//! Favorites controllers: a single-property toggle and the user's full list.
//!
//! Both treat the backend as authoritative. Local state changes only after
//! the backend confirms a write, and any realtime change signal triggers a
//! full re-fetch rather than an incremental merge.

pub mod list;
pub mod toggle;

mod lifecycle;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::app::{KeepsakeError, Result};
use crate::domain::{NewFavorite, PropertyId, RecordId, ToggleOutcome, UserId};
use crate::notify::{self, NoticeKind, Notifier};
use crate::realtime::RealtimeChannel;
use crate::store::FavoriteStore;

use lifecycle::with_timeout;

pub use list::FavoriteList;
pub use toggle::FavoriteToggle;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators handed to every controller by the composition root.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn FavoriteStore + Send + Sync>,
    pub realtime: Arc<dyn RealtimeChannel + Send + Sync>,
    pub notifier: Arc<dyn Notifier + Send + Sync>,
    pub request_timeout: Duration,
}

impl Services {
    pub fn new(
        store: Arc<dyn FavoriteStore + Send + Sync>,
        realtime: Arc<dyn RealtimeChannel + Send + Sync>,
        notifier: Arc<dyn Notifier + Send + Sync>,
    ) -> Self {
        Self {
            store,
            realtime,
            notifier,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// What the caller believes before toggling.
pub(crate) enum Current {
    Favorited(Option<RecordId>),
    NotFavorited,
}

pub(crate) fn require_user<'a>(services: &Services, user: Option<&'a UserId>) -> Result<&'a UserId> {
    user.ok_or_else(|| {
        services
            .notifier
            .notify(NoticeKind::Error, notify::SIGN_IN_REQUIRED);
        KeepsakeError::Unauthenticated
    })
}

/// Perform the backend half of a toggle and emit the user notice.
/// A uniqueness conflict on insert converges to "favorited".
pub(crate) async fn remote_toggle(
    services: &Services,
    user_id: &UserId,
    property_id: &PropertyId,
    current: Current,
    resolve_conflict_id: bool,
) -> Result<ToggleOutcome> {
    let limit = services.request_timeout;
    let store = &services.store;

    let result = match current {
        Current::Favorited(record_id) => {
            let deleted = match &record_id {
                Some(id) => with_timeout(limit, store.delete_by_id(user_id, id)).await,
                None => with_timeout(limit, store.delete_by_keys(user_id, property_id)).await,
            };
            deleted.map(|()| ToggleOutcome::Removed)
        }
        Current::NotFavorited => {
            let favorite = NewFavorite::new(user_id.clone(), property_id.clone());
            match with_timeout(limit, store.insert(&favorite)).await {
                Ok(record) => Ok(ToggleOutcome::Added(record.id)),
                Err(e) if e.is_conflict() => {
                    debug!(property = %property_id, "favorite already exists, converging");
                    let existing = if resolve_conflict_id {
                        with_timeout(limit, store.find(user_id, property_id))
                            .await
                            .ok()
                            .flatten()
                            .map(|r| r.id)
                    } else {
                        None
                    };
                    Ok(ToggleOutcome::AlreadyFavorite(existing))
                }
                Err(e) => Err(e),
            }
        }
    };

    let notifier = &services.notifier;
    match &result {
        Ok(ToggleOutcome::Added(_)) => notifier.notify(NoticeKind::Success, notify::ADDED),
        Ok(ToggleOutcome::AlreadyFavorite(_)) => {
            notifier.notify(NoticeKind::Info, notify::ALREADY_FAVORITE)
        }
        Ok(ToggleOutcome::Removed) => notifier.notify(NoticeKind::Success, notify::REMOVED),
        Ok(ToggleOutcome::Ignored) => {}
        Err(e) => {
            warn!("Error toggling favorite {}: {}", property_id, e);
            notifier.notify(NoticeKind::Error, notify::UPDATE_FAILED);
        }
    }

    result.map_err(KeepsakeError::into_transient)
}

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::app::{KeepsakeError, Result};
use crate::controller::lifecycle::{with_timeout, Invalidate, LiveFeed, Liveness};
use crate::controller::{remote_toggle, require_user, Current, Services};
use crate::domain::{FavoriteStatus, PropertyId, ToggleOutcome, UserId};
use crate::realtime::ChangeFilter;

#[derive(Default)]
struct ItemState {
    user_id: Option<UserId>,
    status: FavoriteStatus,
    loading: bool,
}

struct ToggleInner {
    services: Services,
    property_id: PropertyId,
    liveness: Liveness,
    state: Mutex<ItemState>,
    feed: LiveFeed,
    revision: watch::Sender<u64>,
}

/// Favorite status of one property, with a toggle that tolerates double
/// clicks and races against other tabs.
#[derive(Clone)]
pub struct FavoriteToggle {
    inner: Arc<ToggleInner>,
}

impl FavoriteToggle {
    pub fn new(services: Services, property_id: PropertyId) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(ToggleInner {
                services,
                property_id,
                liveness: Liveness::new(),
                state: Mutex::new(ItemState::default()),
                feed: LiveFeed::default(),
                revision,
            }),
        }
    }

    pub fn property_id(&self) -> &PropertyId {
        &self.inner.property_id
    }

    /// Check the status for `user` and follow their changes. `None` resets
    /// to not-favorited and drops the subscription.
    pub async fn start(&self, user: Option<UserId>) -> Result<FavoriteStatus> {
        self.inner.start(user).await
    }

    pub async fn check_status(&self, user: Option<&UserId>) -> Result<FavoriteStatus> {
        self.inner.check_status(user).await
    }

    pub async fn toggle(&self, user: Option<&UserId>) -> Result<ToggleOutcome> {
        self.inner.toggle(user).await
    }

    pub fn status(&self) -> FavoriteStatus {
        self.inner.state().status.clone()
    }

    pub fn is_favorite(&self) -> bool {
        self.inner.state().status.is_favorite
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state().loading
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn dispose(&self) {
        self.inner.liveness.deactivate();
        self.inner.release();
    }
}

impl ToggleInner {
    fn state(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self) {
        self.feed.release(&*self.services.realtime);
    }

    fn set_status(&self, status: FavoriteStatus) {
        let changed = {
            let mut state = self.state();
            let changed = state.status != status;
            state.status = status;
            changed
        };
        if changed {
            self.revision.send_modify(|rev| *rev += 1);
        }
    }

    async fn start(self: &Arc<Self>, user: Option<UserId>) -> Result<FavoriteStatus> {
        if !self.liveness.is_active() {
            return Err(KeepsakeError::Disposed);
        }

        let Some(user_id) = user else {
            self.release();
            self.liveness.next_token();
            self.state().user_id = None;
            self.set_status(FavoriteStatus::not_favorited());
            return Ok(FavoriteStatus::not_favorited());
        };

        let same_user = self.state().user_id.as_ref() == Some(&user_id);
        if !same_user {
            self.release();
            self.state().user_id = Some(user_id.clone());
        }

        if !self.feed.is_attached() {
            let realtime = &self.services.realtime;
            let filter = ChangeFilter::favorites(user_id.clone());
            match with_timeout(self.services.request_timeout, realtime.subscribe(filter)).await {
                Ok(subscription) => {
                    let wanted = self.liveness.is_active()
                        && self.state().user_id.as_ref() == Some(&user_id);
                    if !wanted {
                        realtime.unsubscribe(subscription.handle);
                    } else if let Err(handle) =
                        self.feed
                            .attach(subscription, Arc::downgrade(self), user_id.clone())
                    {
                        realtime.unsubscribe(handle);
                    }
                }
                Err(e) => warn!("Realtime subscription failed for {}: {}", self.property_id, e),
            }
        }

        self.check_status(Some(&user_id)).await
    }

    async fn check_status(&self, user: Option<&UserId>) -> Result<FavoriteStatus> {
        let Some(user_id) = user else {
            return Ok(FavoriteStatus::not_favorited());
        };

        let token = self.liveness.next_token();
        let found = with_timeout(
            self.services.request_timeout,
            self.services.store.find(user_id, &self.property_id),
        )
        .await
        .map_err(|e| {
            warn!("Failed to check favorite {}: {}", self.property_id, e);
            e.into_transient()
        })?;

        let status = match found {
            Some(record) => FavoriteStatus::favorited(Some(record.id)),
            None => FavoriteStatus::not_favorited(),
        };

        if self.liveness.is_active() && self.liveness.is_current(token) {
            self.set_status(status.clone());
        } else {
            debug!(property = %self.property_id, "discarding stale favorite status");
        }
        Ok(status)
    }

    async fn toggle(&self, user: Option<&UserId>) -> Result<ToggleOutcome> {
        if !self.liveness.is_active() {
            return Err(KeepsakeError::Disposed);
        }
        let user_id = require_user(&self.services, user)?;

        let (current, session) = {
            let mut state = self.state();
            if state.loading {
                debug!(property = %self.property_id, "toggle already in flight, ignoring");
                return Ok(ToggleOutcome::Ignored);
            }
            state.loading = true;
            let current = if state.status.is_favorite {
                Current::Favorited(state.status.record_id.clone())
            } else {
                Current::NotFavorited
            };
            (current, state.user_id.clone())
        };
        let loading = Loading(self);

        let result =
            remote_toggle(&self.services, user_id, &self.property_id, current, true).await;
        drop(loading);

        if let Ok(outcome) = &result {
            let same_session = self.state().user_id == session;
            if !same_session {
                debug!(property = %self.property_id, "user changed during toggle, not applying");
            } else if self.liveness.is_active() {
                // A status check started before this write may answer late.
                self.liveness.next_token();
                match outcome {
                    ToggleOutcome::Added(id) => {
                        self.set_status(FavoriteStatus::favorited(Some(id.clone())))
                    }
                    ToggleOutcome::AlreadyFavorite(id) => {
                        self.set_status(FavoriteStatus::favorited(id.clone()))
                    }
                    ToggleOutcome::Removed => self.set_status(FavoriteStatus::not_favorited()),
                    ToggleOutcome::Ignored => {}
                }
            }
        }

        result
    }
}

/// Clears the loading flag even if the toggle future is dropped mid-request.
struct Loading<'a>(&'a ToggleInner);

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.state().loading = false;
    }
}

#[async_trait]
impl Invalidate for ToggleInner {
    async fn invalidate(&self, user_id: &UserId) {
        if let Err(e) = self.check_status(Some(user_id)).await {
            warn!("Favorite resync failed for {}: {}", self.property_id, e);
        }
    }
}

impl Drop for ToggleInner {
    fn drop(&mut self) {
        self.release();
    }
}

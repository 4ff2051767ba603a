use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::{KeepsakeError, Result};
use crate::controller::lifecycle::{with_timeout, Invalidate, LiveFeed, Liveness};
use crate::controller::{remote_toggle, require_user, Current, Services};
use crate::domain::{FavoriteSet, ListPhase, PropertyId, ToggleOutcome, UserId};
use crate::realtime::ChangeFilter;

struct ListState {
    user_id: Option<UserId>,
    phase: ListPhase,
    favorites: FavoriteSet,
    in_flight: HashSet<PropertyId>,
}

struct ListInner {
    services: Services,
    liveness: Liveness,
    state: Mutex<ListState>,
    feed: LiveFeed,
    revision: watch::Sender<u64>,
}

/// The signed-in user's full set of favorited properties, kept live through
/// a realtime subscription.
///
/// The set is only written after the backend confirms a change; remote
/// events never patch it directly but trigger a full reload. Handles are
/// cheap to clone and share one set.
#[derive(Clone)]
pub struct FavoriteList {
    inner: Arc<ListInner>,
}

impl FavoriteList {
    pub fn new(services: Services) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(ListInner {
                services,
                liveness: Liveness::new(),
                state: Mutex::new(ListState {
                    user_id: None,
                    phase: ListPhase::Unauthenticated,
                    favorites: FavoriteSet::new(),
                    in_flight: HashSet::new(),
                }),
                feed: LiveFeed::default(),
                revision,
            }),
        }
    }

    /// Bind the list to `user`: subscribe to their changes and load the
    /// set. `None` signs out. Starting again for the same user is a no-op.
    pub async fn start(&self, user: Option<UserId>) -> Result<()> {
        self.inner.start(user).await
    }

    /// Replace the set with a fresh fetch. Without a user the set is
    /// emptied and nothing is fetched.
    pub async fn load(&self, user: Option<&UserId>) -> Result<()> {
        self.inner.load(user).await
    }

    pub async fn toggle(
        &self,
        user: Option<&UserId>,
        property_id: &PropertyId,
    ) -> Result<ToggleOutcome> {
        self.inner.toggle(user, property_id).await
    }

    pub fn is_favorite(&self, property_id: &PropertyId) -> bool {
        self.inner.state().favorites.contains(property_id)
    }

    pub fn is_toggling(&self, property_id: &PropertyId) -> bool {
        self.inner.state().in_flight.contains(property_id)
    }

    pub fn favorite_ids(&self) -> FavoriteSet {
        self.inner.state().favorites.clone()
    }

    pub fn phase(&self) -> ListPhase {
        self.inner.state().phase
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.inner.state().user_id.clone()
    }

    /// Revision counter, bumped whenever the set or phase changes.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn sign_out(&self) {
        self.inner.sign_out();
    }

    /// Stop the list for good. Pending results are dropped unapplied.
    pub fn dispose(&self) {
        if self.inner.liveness.deactivate() {
            info!("favorites list disposed");
        }
        self.inner.release();
    }
}

impl ListInner {
    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn release(&self) {
        self.feed.release(&*self.services.realtime);
    }

    fn ensure_active(&self) -> Result<()> {
        if self.liveness.is_active() {
            Ok(())
        } else {
            Err(KeepsakeError::Disposed)
        }
    }

    async fn start(self: &Arc<Self>, user: Option<UserId>) -> Result<()> {
        self.ensure_active()?;
        let Some(user_id) = user else {
            self.sign_out();
            return Ok(());
        };

        let same_user = self.state().user_id.as_ref() == Some(&user_id);
        if same_user && self.feed.is_attached() {
            return Ok(());
        }

        if !same_user {
            self.liveness.next_token();
            self.release();
            {
                let mut state = self.state();
                state.user_id = Some(user_id.clone());
                state.phase = ListPhase::Loading;
                state.favorites.clear();
                state.in_flight.clear();
            }
            self.bump();
            info!(user = %user_id, "favorites list started");
        }

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
            Err(e) => warn!("Realtime subscription failed, favorites will not live-update: {}", e),
        }

        self.load(Some(&user_id)).await
    }

    async fn load(&self, user: Option<&UserId>) -> Result<()> {
        self.ensure_active()?;
        let token = self.liveness.next_token();

        let Some(user_id) = user else {
            {
                let mut state = self.state();
                state.favorites.clear();
                state.phase = ListPhase::Unauthenticated;
            }
            self.bump();
            return Ok(());
        };

        self.state().phase = ListPhase::Loading;
        let fetched = with_timeout(
            self.services.request_timeout,
            self.services.store.property_ids(user_id),
        )
        .await;

        match self.apply_snapshot(token, fetched) {
            Err(KeepsakeError::StaleResponse) => {
                debug!(token, user = %user_id, "discarding stale favorites snapshot");
                Ok(())
            }
            other => other,
        }
    }

    fn apply_snapshot(&self, token: u64, fetched: Result<Vec<PropertyId>>) -> Result<()> {
        if !self.liveness.is_active() || !self.liveness.is_current(token) {
            return Err(KeepsakeError::StaleResponse);
        }

        match fetched {
            Ok(ids) => {
                let count = {
                    let mut state = self.state();
                    state.favorites = ids.into_iter().collect();
                    state.phase = ListPhase::Ready;
                    state.favorites.len()
                };
                self.bump();
                debug!(count, "favorites loaded");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load favorites: {}", e);
                self.state().phase = ListPhase::Ready;
                self.bump();
                Err(e.into_transient())
            }
        }
    }

    async fn toggle(&self, user: Option<&UserId>, property_id: &PropertyId) -> Result<ToggleOutcome> {
        self.ensure_active()?;
        let user_id = require_user(&self.services, user)?;

        let current = {
            let mut state = self.state();
            if !state.in_flight.insert(property_id.clone()) {
                debug!(property = %property_id, "toggle already in flight, ignoring");
                return Ok(ToggleOutcome::Ignored);
            }
            if state.favorites.contains(property_id) {
                Current::Favorited(None)
            } else {
                Current::NotFavorited
            }
        };

        let in_flight = InFlight {
            inner: self,
            property_id,
            armed: true,
        };

        let result = remote_toggle(&self.services, user_id, property_id, current, false).await;

        let applied = {
            let mut state = self.state();
            in_flight.settle(&mut state);

            let owner = state.user_id.as_ref() == Some(user_id);
            match &result {
                Ok(outcome) if self.liveness.is_active() && owner => match outcome {
                    ToggleOutcome::Added(_) | ToggleOutcome::AlreadyFavorite(_) => {
                        state.favorites.insert(property_id.clone());
                        true
                    }
                    ToggleOutcome::Removed => {
                        state.favorites.remove(property_id);
                        true
                    }
                    ToggleOutcome::Ignored => false,
                },
                _ => false,
            }
        };
        if applied {
            self.bump();
        }

        result
    }

    fn sign_out(&self) {
        if !self.liveness.is_active() {
            return;
        }
        self.liveness.next_token();
        self.release();

        let was_signed_in = {
            let mut state = self.state();
            let was = state.user_id.take().is_some();
            state.phase = ListPhase::Unauthenticated;
            state.favorites.clear();
            state.in_flight.clear();
            was
        };
        self.bump();
        if was_signed_in {
            info!("favorites list signed out");
        }
    }
}

/// A property's in-flight mark. Dropping it unsettled (the toggle future
/// was cancelled) clears the mark.
struct InFlight<'a> {
    inner: &'a ListInner,
    property_id: &'a PropertyId,
    armed: bool,
}

impl InFlight<'_> {
    fn settle(mut self, state: &mut ListState) {
        state.in_flight.remove(self.property_id);
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.state().in_flight.remove(self.property_id);
        }
    }
}

#[async_trait]
impl Invalidate for ListInner {
    async fn invalidate(&self, user_id: &UserId) {
        if let Err(e) = self.load(Some(user_id)).await {
            warn!("Favorites resync failed: {}", e);
        }
    }
}

impl Drop for ListInner {
    fn drop(&mut self) {
        self.release();
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::app::error::{KeepsakeError, Result};
use crate::config::{BackendKind, Config};
use crate::controller::{FavoriteList, FavoriteToggle, Services};
use crate::domain::{PropertyId, UserId};
use crate::notify::{ConsoleNotifier, Notifier};
use crate::realtime::{PollingChannel, RealtimeChannel, RealtimeHub};
use crate::store::{FavoriteStore, RestStore, SqliteStore};

pub struct AppContext {
    pub store: Arc<dyn FavoriteStore + Send + Sync>,
    pub realtime: Arc<dyn RealtimeChannel + Send + Sync>,
    pub services: Services,
    pub user: Option<UserId>,
}

impl AppContext {
    /// Wire the configured backend. Notices go to the console.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_notifier(config, Arc::new(ConsoleNotifier))
    }

    pub fn with_notifier(config: &Config, notifier: Arc<dyn Notifier + Send + Sync>) -> Result<Self> {
        let (store, realtime) = match config.backend.kind {
            BackendKind::Sqlite => {
                let db_path = match &config.sqlite.path {
                    Some(p) => p.clone(),
                    None => Self::default_db_path()?,
                };
                info!(path = %db_path.display(), "Opening local favorites store");

                let hub = Arc::new(RealtimeHub::new());
                let store: Arc<dyn FavoriteStore + Send + Sync> =
                    Arc::new(SqliteStore::new(&db_path)?.with_realtime(hub.clone()));
                let realtime: Arc<dyn RealtimeChannel + Send + Sync> = hub;
                (store, realtime)
            }
            BackendKind::Rest => {
                let url = config.rest.url.as_deref().ok_or_else(|| {
                    KeepsakeError::Config("rest.url is required for the rest backend".into())
                })?;
                let anon_key = config.rest.anon_key.as_deref().ok_or_else(|| {
                    KeepsakeError::Config("rest.anon_key is required for the rest backend".into())
                })?;
                info!(url, "Connecting to hosted favorites store");

                let store: Arc<dyn FavoriteStore + Send + Sync> = Arc::new(
                    RestStore::new(
                        url,
                        anon_key,
                        config.rest.access_token.as_deref(),
                        config.request_timeout(),
                    )?
                    .with_retry(config.retry.clone()),
                );
                let realtime: Arc<dyn RealtimeChannel + Send + Sync> = Arc::new(
                    PollingChannel::with_interval(store.clone(), config.poll_interval()),
                );
                (store, realtime)
            }
        };

        let services = Services::new(store.clone(), realtime.clone(), notifier)
            .with_request_timeout(config.request_timeout());
        let user = config.session.user_id.as_deref().map(UserId::from);

        Ok(Self {
            store,
            realtime,
            services,
            user,
        })
    }

    /// A throwaway SQLite database with in-process change events.
    pub fn in_memory(notifier: Arc<dyn Notifier + Send + Sync>) -> Result<Self> {
        let hub = Arc::new(RealtimeHub::new());
        let store: Arc<dyn FavoriteStore + Send + Sync> =
            Arc::new(SqliteStore::in_memory()?.with_realtime(hub.clone()));
        let realtime: Arc<dyn RealtimeChannel + Send + Sync> = hub;
        let services = Services::new(store.clone(), realtime.clone(), notifier);

        Ok(Self {
            store,
            realtime,
            services,
            user: None,
        })
    }

    /// Replace the signed-in user; `None` signs out.
    pub fn with_user(mut self, user: Option<UserId>) -> Self {
        self.user = user;
        self
    }

    pub fn favorite_list(&self) -> FavoriteList {
        FavoriteList::new(self.services.clone())
    }

    pub fn favorite_toggle(&self, property_id: PropertyId) -> FavoriteToggle {
        FavoriteToggle::new(self.services.clone(), property_id)
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| KeepsakeError::Config("Could not find data directory".into()))?;
        let keepsake_dir = data_dir.join("keepsake");
        std::fs::create_dir_all(&keepsake_dir)?;
        Ok(keepsake_dir.join("keepsake.db"))
    }
}

pub mod rest;
pub mod sqlite;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::{FavoriteRecord, NewFavorite, PropertyId, RecordId, UserId};

pub use rest::RestStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait FavoriteStore {
    /// Fails with `KeepsakeError::Conflict` when the pair already exists.
    async fn insert(&self, favorite: &NewFavorite) -> Result<FavoriteRecord>;
    async fn delete_by_id(&self, user_id: &UserId, id: &RecordId) -> Result<()>;
    async fn delete_by_keys(&self, user_id: &UserId, property_id: &PropertyId) -> Result<()>;
    async fn find(&self, user_id: &UserId, property_id: &PropertyId)
        -> Result<Option<FavoriteRecord>>;
    async fn property_ids(&self, user_id: &UserId) -> Result<Vec<PropertyId>>;
    /// Newest first.
    async fn list(&self, user_id: &UserId) -> Result<Vec<FavoriteRecord>>;
}

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use serde_json::json;
use uuid::Uuid;

use crate::app::{KeepsakeError, Result};
use crate::domain::{FavoriteRecord, NewFavorite, PropertyId, RecordId, UserId};
use crate::realtime::{ChangeEvent, ChangeKind, RealtimeHub};
use crate::store::FavoriteStore;

const RECORD_COLUMNS: &str = "id, user_id, property_id, created_at";

/// Local favorites backend. When a hub is attached, every committed insert
/// or delete is published to it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    realtime: Option<Arc<RealtimeHub>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            realtime: None,
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn with_realtime(mut self, hub: Arc<RealtimeHub>) -> Self {
        self.realtime = Some(hub);
        self
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| KeepsakeError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            KeepsakeError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn publish(&self, kind: ChangeKind, record: &FavoriteRecord) {
        if let Some(hub) = &self.realtime {
            let payload = json!({
                "id": record.id,
                "property_id": record.property_id,
            });
            hub.publish(ChangeEvent::favorites(kind, record.user_id.clone(), payload));
        }
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FavoriteRecord> {
        Ok(FavoriteRecord {
            id: RecordId::new(row.get::<_, String>(0)?),
            user_id: UserId::new(row.get::<_, String>(1)?),
            property_id: PropertyId::new(row.get::<_, String>(2)?),
            created_at: row
                .get::<_, Option<String>>(3)?
                .and_then(|s| Self::parse_datetime(&s)),
        })
    }

    /// Delete matching rows and publish one event per removed row.
    fn delete_where(&self, clause: &str, user_id: &UserId, value: &str) -> Result<()> {
        let removed = {
            let conn = self.conn()?;
            let select = format!(
                "SELECT {} FROM favorites WHERE user_id = ?1 AND {} = ?2",
                RECORD_COLUMNS, clause
            );
            let rows = conn
                .prepare(&select)?
                .query_map(params![user_id.as_str(), value], Self::record_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            conn.execute(
                &format!("DELETE FROM favorites WHERE user_id = ?1 AND {} = ?2", clause),
                params![user_id.as_str(), value],
            )?;
            rows
        };

        for record in &removed {
            self.publish(ChangeKind::Delete, record);
        }
        Ok(())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[async_trait]
impl FavoriteStore for SqliteStore {
    async fn insert(&self, favorite: &NewFavorite) -> Result<FavoriteRecord> {
        let now = Utc::now();
        let record = FavoriteRecord {
            id: RecordId::new(Uuid::new_v4().to_string()),
            user_id: favorite.user_id.clone(),
            property_id: favorite.property_id.clone(),
            created_at: Some(now),
        };

        {
            let conn = self.conn()?;
            let inserted = conn.execute(
                "INSERT INTO favorites (id, user_id, property_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.as_str(),
                    record.user_id.as_str(),
                    record.property_id.as_str(),
                    now.to_rfc3339_opts(SecondsFormat::Micros, true)
                ],
            );

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    return Err(KeepsakeError::Conflict {
                        property_id: favorite.property_id.to_string(),
                    });
                }
                return Err(e.into());
            }
        }

        self.publish(ChangeKind::Insert, &record);
        Ok(record)
    }

    async fn delete_by_id(&self, user_id: &UserId, id: &RecordId) -> Result<()> {
        self.delete_where("id", user_id, id.as_str())
    }

    async fn delete_by_keys(&self, user_id: &UserId, property_id: &PropertyId) -> Result<()> {
        self.delete_where("property_id", user_id, property_id.as_str())
    }

    async fn find(
        &self,
        user_id: &UserId,
        property_id: &PropertyId,
    ) -> Result<Option<FavoriteRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM favorites WHERE user_id = ?1 AND property_id = ?2",
                    RECORD_COLUMNS
                ),
                params![user_id.as_str(), property_id.as_str()],
                Self::record_from_row,
            )
            .optional()?;

        Ok(record)
    }

    async fn property_ids(&self, user_id: &UserId) -> Result<Vec<PropertyId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT property_id FROM favorites WHERE user_id = ?1")?;

        let ids = stmt
            .query_map(params![user_id.as_str()], |row| {
                Ok(PropertyId::new(row.get::<_, String>(0)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ids)
    }

    async fn list(&self, user_id: &UserId) -> Result<Vec<FavoriteRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM favorites WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![user_id.as_str()], Self::record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{ChangeFilter, RealtimeChannel};

    fn fav(user: &str, property: &str) -> NewFavorite {
        NewFavorite::new(user.into(), property.into())
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = SqliteStore::in_memory().unwrap();
        let record = store.insert(&fav("u1", "p1")).await.unwrap();

        let found = store.find(&"u1".into(), &"p1".into()).await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert!(found.created_at.is_some());
        assert!(store.find(&"u2".into(), &"p1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert(&fav("u1", "p1")).await.unwrap();

        let err = store.insert(&fav("u1", "p1")).await.unwrap_err();
        assert!(err.is_conflict());

        // Same property for another user is fine.
        store.insert(&fav("u2", "p1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_owner() {
        let store = SqliteStore::in_memory().unwrap();
        let record = store.insert(&fav("u1", "p1")).await.unwrap();

        store.delete_by_id(&"intruder".into(), &record.id).await.unwrap();
        assert!(store.find(&"u1".into(), &"p1".into()).await.unwrap().is_some());

        store.delete_by_id(&"u1".into(), &record.id).await.unwrap();
        assert!(store.find(&"u1".into(), &"p1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        for p in ["p1", "p2", "p3"] {
            store.insert(&fav("u1", p)).await.unwrap();
        }

        let listed: Vec<_> = store
            .list(&"u1".into())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.property_id.to_string())
            .collect();
        assert_eq!(listed, vec!["p3", "p2", "p1"]);

        let mut ids = store.property_ids(&"u1".into()).await.unwrap();
        ids.sort();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.insert(&fav("u1", "p1")).await.unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.property_ids(&"u1".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_writes_publish_to_hub() {
        let hub = Arc::new(RealtimeHub::new());
        let store = SqliteStore::in_memory().unwrap().with_realtime(hub.clone());
        let mut sub = hub.subscribe(ChangeFilter::favorites("u1".into())).await.unwrap();

        store.insert(&fav("u1", "p1")).await.unwrap();
        let _ = store.insert(&fav("u1", "p1")).await;
        store.delete_by_keys(&"u1".into(), &"p1".into()).await.unwrap();
        store.delete_by_keys(&"u1".into(), &"p1".into()).await.unwrap();

        assert_eq!(sub.events.try_recv().unwrap().kind, ChangeKind::Insert);
        assert_eq!(sub.events.try_recv().unwrap().kind, ChangeKind::Delete);
        assert!(sub.events.try_recv().is_err());
    }
}

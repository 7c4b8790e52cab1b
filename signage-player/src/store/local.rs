//! Local durable backend
//!
//! Collections live in the `kv_store` table: media as one JSON array under
//! `media_<app_id>`, settings as one JSON object under `settings_<app_id>`.
//! Every operation is a read-modify-write of the whole value, serialized by
//! a write lock. There is no push; callers re-read after writing.

use super::{
    push_unsupported, sort_records_by_order, BackendKind, Collection, Record, Snapshot,
    StoreAdapter, Subscription, WriteMode, SETTINGS_DOC_ID,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};
use signage_common::db;
use signage_common::model::local_id;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::debug;

/// SQLite-backed store
pub struct LocalStore {
    db: SqlitePool,
    app_id: String,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(db: SqlitePool, app_id: impl Into<String>) -> Self {
        Self {
            db,
            app_id: app_id.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store over a fresh in-memory database
    pub async fn open_in_memory(app_id: &str) -> Result<Self> {
        let db = db::init_memory_database().await?;
        Ok(Self::new(db, app_id))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    fn key(&self, collection: Collection) -> String {
        match collection {
            Collection::Media => format!("media_{}", self.app_id),
            Collection::Settings => format!("settings_{}", self.app_id),
        }
    }

    async fn load_media(&self) -> Result<Snapshot> {
        let rows: Vec<Map<String, Value>> = db::get_json(&self.db, &self.key(Collection::Media))
            .await?
            .unwrap_or_default();

        let mut snapshot: Snapshot = rows
            .into_iter()
            .filter_map(|mut row| {
                let id = match row.remove("id") {
                    Some(Value::String(id)) => id,
                    _ => return None,
                };
                Some(Record::new(id, row))
            })
            .collect();
        sort_records_by_order(&mut snapshot);
        Ok(snapshot)
    }

    async fn save_media(&self, snapshot: &Snapshot) -> Result<()> {
        let rows: Vec<Map<String, Value>> = snapshot
            .iter()
            .map(|record| {
                let mut row = Map::new();
                row.insert("id".to_string(), Value::String(record.id.clone()));
                row.extend(record.data.clone());
                row
            })
            .collect();
        db::set_json(&self.db, &self.key(Collection::Media), &rows).await?;
        Ok(())
    }

    async fn load_settings(&self) -> Result<Option<Map<String, Value>>> {
        Ok(db::get_json(&self.db, &self.key(Collection::Settings)).await?)
    }

    async fn save_settings(&self, data: &Map<String, Value>) -> Result<()> {
        db::set_json(&self.db, &self.key(Collection::Settings), data).await?;
        Ok(())
    }

    /// `local_<millis>`, bumped until unique within `existing`
    fn unique_local_id(existing: &Snapshot) -> String {
        let mut now = Utc::now();
        loop {
            let id = local_id(now);
            if !existing.iter().any(|r| r.id == id) {
                return id;
            }
            now += Duration::milliseconds(1);
        }
    }
}

fn merge_into(target: &mut Map<String, Value>, data: Map<String, Value>, mode: WriteMode) {
    match mode {
        WriteMode::Merge => target.extend(data),
        WriteMode::Replace => *target = data,
    }
}

#[async_trait]
impl StoreAdapter for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn read(&self, collection: Collection) -> Result<Snapshot> {
        match collection {
            Collection::Media => self.load_media().await,
            Collection::Settings => Ok(self
                .load_settings()
                .await?
                .map(|data| vec![Record::new(SETTINGS_DOC_ID, data)])
                .unwrap_or_default()),
        }
    }

    async fn subscribe(&self, _collection: Collection) -> Result<Subscription> {
        Err(push_unsupported(BackendKind::Local))
    }

    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        match collection {
            Collection::Media => {
                let mut snapshot = self.load_media().await?;
                let id = Self::unique_local_id(&snapshot);
                snapshot.push(Record::new(id.clone(), data));
                sort_records_by_order(&mut snapshot);
                self.save_media(&snapshot).await?;
                debug!("Created local media document {}", id);
                Ok(id)
            }
            Collection::Settings => {
                self.save_settings(&data).await?;
                Ok(SETTINGS_DOC_ID.to_string())
            }
        }
    }

    async fn write(
        &self,
        collection: Collection,
        id: &str,
        data: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match collection {
            Collection::Media => {
                let mut snapshot = self.load_media().await?;
                match snapshot.iter_mut().find(|r| r.id == id) {
                    Some(record) => merge_into(&mut record.data, data, mode),
                    None => snapshot.push(Record::new(id, data)),
                }
                sort_records_by_order(&mut snapshot);
                self.save_media(&snapshot).await
            }
            Collection::Settings => {
                if id != SETTINGS_DOC_ID {
                    return Err(Error::Store(format!("Unknown settings document: {}", id)));
                }
                let mut stored = self.load_settings().await?.unwrap_or_default();
                merge_into(&mut stored, data, mode);
                self.save_settings(&stored).await
            }
        }
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.batch_delete(collection, &[id.to_string()]).await
    }

    async fn batch_delete(&self, collection: Collection, ids: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match collection {
            Collection::Media => {
                let mut snapshot = self.load_media().await?;
                snapshot.retain(|r| !ids.contains(&r.id));
                self.save_media(&snapshot).await
            }
            Collection::Settings => {
                if ids.iter().any(|id| id == SETTINGS_DOC_ID) {
                    db::delete_value(&self.db, &self.key(Collection::Settings)).await?;
                }
                Ok(())
            }
        }
    }

    async fn write_all(&self, collection: Collection, mut snapshot: Snapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match collection {
            Collection::Media => {
                sort_records_by_order(&mut snapshot);
                self.save_media(&snapshot).await
            }
            Collection::Settings => match snapshot.into_iter().next() {
                Some(record) => self.save_settings(&record.data).await,
                None => {
                    db::delete_value(&self.db, &self.key(Collection::Settings)).await?;
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn test_create_synthesizes_unique_local_ids() {
        let store = LocalStore::open_in_memory("test").await.unwrap();

        let a = store
            .create(Collection::Media, doc(json!({"url": "/a.png", "type": "image", "order": 0})))
            .await
            .unwrap();
        let b = store
            .create(Collection::Media, doc(json!({"url": "/b.png", "type": "image", "order": 1})))
            .await
            .unwrap();

        assert!(a.starts_with("local_"));
        assert!(b.starts_with("local_"));
        assert_ne!(a, b);

        let snapshot = store.read(Collection::Media).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, a);
        assert!(!snapshot[0].data.contains_key("id"));
    }

    #[tokio::test]
    async fn test_media_reads_sorted_and_batch_delete() {
        let store = LocalStore::open_in_memory("test").await.unwrap();
        store
            .write_all(
                Collection::Media,
                vec![
                    Record::new("x", doc(json!({"order": 2}))),
                    Record::new("y", doc(json!({"order": 0}))),
                    Record::new("z", doc(json!({"order": 1}))),
                ],
            )
            .await
            .unwrap();

        let ids: Vec<_> = store
            .read(Collection::Media)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["y", "z", "x"]);

        store
            .batch_delete(Collection::Media, &["y".to_string(), "missing".to_string()])
            .await
            .unwrap();
        store.delete(Collection::Media, "x").await.unwrap();
        let remaining = store.read(Collection::Media).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "z");
    }

    #[tokio::test]
    async fn test_settings_merge_and_replace() {
        let store = LocalStore::open_in_memory("test").await.unwrap();
        assert!(store.read(Collection::Settings).await.unwrap().is_empty());

        store
            .write(
                Collection::Settings,
                SETTINGS_DOC_ID,
                doc(json!({"marqueeText": "A", "logoUrl": "/logo.png"})),
                WriteMode::Replace,
            )
            .await
            .unwrap();
        store
            .write(
                Collection::Settings,
                SETTINGS_DOC_ID,
                doc(json!({"marqueeText": "B"})),
                WriteMode::Merge,
            )
            .await
            .unwrap();

        let snapshot = store.read(Collection::Settings).await.unwrap();
        assert_eq!(snapshot[0].id, SETTINGS_DOC_ID);
        assert_eq!(snapshot[0].data["marqueeText"], "B");
        assert_eq!(snapshot[0].data["logoUrl"], "/logo.png");

        store
            .write(
                Collection::Settings,
                SETTINGS_DOC_ID,
                doc(json!({"marqueeText": "C"})),
                WriteMode::Replace,
            )
            .await
            .unwrap();
        let snapshot = store.read(Collection::Settings).await.unwrap();
        assert!(!snapshot[0].data.contains_key("logoUrl"));
    }

    #[tokio::test]
    async fn test_subscribe_is_unsupported() {
        let store = LocalStore::open_in_memory("test").await.unwrap();
        assert!(matches!(
            store.subscribe(Collection::Media).await,
            Err(Error::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_are_namespaced_by_app() {
        let db = db::init_memory_database().await.unwrap();
        let lobby = LocalStore::new(db.clone(), "lobby");
        let foyer = LocalStore::new(db, "foyer");

        lobby
            .write(Collection::Media, "m1", doc(json!({"order": 0})), WriteMode::Replace)
            .await
            .unwrap();
        assert_eq!(lobby.read(Collection::Media).await.unwrap().len(), 1);
        assert!(foyer.read(Collection::Media).await.unwrap().is_empty());
        assert!(db::get_value(lobby.pool(), "media_lobby").await.unwrap().is_some());
    }
}

//! Persistent store adapters
//!
//! One contract, two implementations:
//! - [`remote::RemoteStore`]: realtime document service, pushes snapshots
//! - [`local::LocalStore`]: SQLite key-value table, no push
//!
//! [`selector::StoreSelector`] picks the implementation once at startup and
//! owns the permanent fallback to the local store. Only the repositories
//! look at which backend is active; schedulers never do.

pub mod local;
pub mod remote;
pub mod selector;

pub use local::LocalStore;
pub use remote::RemoteStore;
pub use selector::StoreSelector;
pub use signage_common::model::BackendKind;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use signage_common::model::{sort_playlist, MediaItem};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Document id of the settings singleton
pub const SETTINGS_DOC_ID: &str = "config";

/// Uid reported when no remote identity is available
pub const OFFLINE_DEMO_UID: &str = "offline-demo-user";

/// Logical collections, backend-agnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Media items keyed by id
    Media,
    /// Settings singleton (`config`)
    Settings,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Media => "media",
            Collection::Settings => "settings",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    fn order(&self) -> i64 {
        self.data.get("order").and_then(Value::as_i64).unwrap_or(i64::MAX)
    }
}

impl From<&MediaItem> for Record {
    fn from(item: &MediaItem) -> Self {
        Record::new(item.id.clone(), item.to_document())
    }
}

/// Ordered collection contents at one point in time
pub type Snapshot = Vec<Record>;

/// Sort media records ascending by their `order` field
pub fn sort_records_by_order(snapshot: &mut Snapshot) {
    snapshot.sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.id.cmp(&b.id)));
}

/// Decode a media snapshot into a sorted playlist
///
/// Documents that do not decode are skipped with a warning rather than
/// poisoning the whole playlist.
pub fn media_from_snapshot(snapshot: &Snapshot) -> Vec<MediaItem> {
    let mut items: Vec<MediaItem> = snapshot
        .iter()
        .filter_map(|record| match MediaItem::from_document(&record.id, &record.data) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping malformed media document {}: {}", record.id, e);
                None
            }
        })
        .collect();
    sort_playlist(&mut items);
    items
}

/// How a write combines with the stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fields not present in the write are kept
    Merge,
    /// Stored document is replaced
    Replace,
}

/// Item delivered by a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Authoritative ordered snapshot
    Snapshot(Snapshot),
    /// Listener failed; no further events follow
    Error(String),
}

/// Live subscription to a collection
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<SubscriptionEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscription fed by a background listener task
    pub fn new(rx: mpsc::Receiver<SubscriptionEvent>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Subscription fed directly through a channel
    pub fn from_receiver(rx: mpsc::Receiver<SubscriptionEvent>) -> Self {
        Self { rx, task: None }
    }

    /// Next event; `None` once the source is gone
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Uniform read/subscribe/write contract over both backends
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Current contents; media snapshots are ordered by `order`
    async fn read(&self, collection: Collection) -> Result<Snapshot>;

    /// Push subscription; unsupported backends return an error
    async fn subscribe(&self, collection: Collection) -> Result<Subscription>;

    /// Create a document and return its id
    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String>;

    /// Write one document
    async fn write(
        &self,
        collection: Collection,
        id: &str,
        data: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<()>;

    /// Delete one document; absent ids are not an error
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Delete several documents atomically
    async fn batch_delete(&self, collection: Collection, ids: &[String]) -> Result<()>;

    /// Replace the whole collection in one write
    async fn write_all(&self, collection: Collection, snapshot: Snapshot) -> Result<()>;

    /// Stable caller identity for display/audit
    async fn sign_in(&self) -> Result<String> {
        Ok(OFFLINE_DEMO_UID.to_string())
    }
}

/// Error for backends that cannot push
pub(crate) fn push_unsupported(kind: BackendKind) -> Error {
    Error::Store(format!("{} backend does not support subscriptions", kind))
}

//! Playlist repository
//!
//! Owns the ordered media list. Readers always see items sorted ascending by
//! `order` with unique keys.
//!
//! Remote backend: writes are spawned and not awaited by the caller; the
//! listener republishes every pushed snapshot. A failed add or delete
//! abandons the remote backend and re-applies the mutation on the local
//! store. A failed reorder only abandons the remote backend.
//!
//! Local backend: writes are awaited and the list is re-read afterwards.

use crate::error::{Error, Result};
use crate::store::{
    media_from_snapshot, BackendKind, Collection, Record, StoreAdapter, StoreSelector,
    Subscription, SubscriptionEvent, WriteMode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use signage_common::events::{EventBus, SignageEvent};
use signage_common::model::{is_local_id, next_order, sort_playlist, validate_media_url};
use signage_common::{MediaItem, MediaKind};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reorder direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

pub struct PlaylistRepository {
    selector: Arc<StoreSelector>,
    events: EventBus,
    items_tx: watch::Sender<Vec<MediaItem>>,
    /// Serializes mutations against each other and against local re-applies
    write_lock: Mutex<()>,
    /// Lowest order not yet claimed by a remote add still in flight
    reserved_order: AtomicI64,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PlaylistRepository {
    pub fn new(selector: Arc<StoreSelector>, events: EventBus) -> Arc<Self> {
        let (items_tx, _) = watch::channel(Vec::new());
        Arc::new(Self {
            selector,
            events,
            items_tx,
            write_lock: Mutex::new(()),
            reserved_order: AtomicI64::new(0),
            listener: std::sync::Mutex::new(None),
        })
    }

    /// Load initial state and, on the remote backend, start listening
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.selector.is_remote() {
            match self.selector.active().subscribe(Collection::Media).await {
                Ok(subscription) => {
                    let handle = tokio::spawn(listen(
                        Arc::downgrade(self),
                        subscription,
                        self.selector.subscribe_kind(),
                    ));
                    self.set_listener(Some(handle));
                    return Ok(());
                }
                Err(e) => {
                    self.selector
                        .fall_back(&format!("media subscription failed: {}", e));
                }
            }
        }
        self.reload_local().await
    }

    /// Stop listening for remote pushes
    pub fn stop(&self) {
        self.set_listener(None);
    }

    fn set_listener(&self, handle: Option<JoinHandle<()>>) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(old) = std::mem::replace(&mut *slot, handle) {
                old.abort();
            }
        }
    }

    /// Current playlist, sorted
    pub fn items(&self) -> Vec<MediaItem> {
        self.items_tx.borrow().clone()
    }

    /// Watch playlist changes
    pub fn subscribe(&self) -> watch::Receiver<Vec<MediaItem>> {
        self.items_tx.subscribe()
    }

    fn publish(&self, mut items: Vec<MediaItem>) {
        sort_playlist(&mut items);
        self.items_tx.send_replace(items.clone());
        self.events.emit_lossy(SignageEvent::PlaylistChanged {
            items,
            backend: self.selector.kind(),
            timestamp: Utc::now(),
        });
    }

    /// Re-read the local store and publish it
    pub async fn reload_local(&self) -> Result<()> {
        let snapshot = match self.selector.local().read(Collection::Media).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Local playlist unreadable, starting empty: {}", e);
                Vec::new()
            }
        };
        self.publish(media_from_snapshot(&snapshot));
        Ok(())
    }

    /// Overwrite the local store with `items` and publish the result
    async fn persist_locally(&self, items: &[MediaItem]) -> Result<()> {
        let snapshot = items.iter().map(Record::from).collect();
        self.selector
            .local()
            .write_all(Collection::Media, snapshot)
            .await?;
        self.reload_local().await
    }

    /// Append a media item
    ///
    /// Rejects malformed URLs before touching any backend.
    pub async fn add_media(self: &Arc<Self>, url: &str, kind: MediaKind, duration: u32) -> Result<()> {
        validate_media_url(url)?;

        let _guard = self.write_lock.lock().await;
        let order = next_order(&self.items()).max(self.reserved_order.load(Ordering::Acquire));
        let mut doc = Map::new();
        doc.insert("url".to_string(), Value::String(url.to_string()));
        doc.insert("type".to_string(), Value::String(kind.to_string()));
        doc.insert("duration".to_string(), Value::from(duration));
        doc.insert("order".to_string(), Value::from(order));
        doc.insert("createdAt".to_string(), Value::String(Utc::now().to_rfc3339()));

        debug!("Adding {} item {} at order {}", kind, url, order);

        if self.selector.is_remote() {
            // The pushed snapshot lags behind; later adds must not reuse this key
            self.reserved_order.store(order + 1, Ordering::Release);
            let repo = Arc::clone(self);
            let remote = self.selector.active();
            tokio::spawn(async move {
                if let Err(e) = remote.create(Collection::Media, doc.clone()).await {
                    warn!("Remote add failed: {}", e);
                    repo.selector.fall_back(&format!("media add failed: {}", e));
                    let _guard = repo.write_lock.lock().await;
                    if let Err(e) = repo.add_locally(doc).await {
                        warn!("Local re-apply of add failed: {}", e);
                    }
                }
            });
            return Ok(());
        }

        self.selector.local().create(Collection::Media, doc).await?;
        self.reload_local().await
    }

    /// Save the current view plus a new document to the local store
    async fn add_locally(&self, doc: Map<String, Value>) -> Result<()> {
        let local = self.selector.local();
        let snapshot = self.items().iter().map(Record::from).collect();
        local.write_all(Collection::Media, snapshot).await?;
        local.create(Collection::Media, doc).await?;
        self.reload_local().await
    }

    /// Remove one item by id
    ///
    /// Locally synthesized ids never exist remotely, so they are always
    /// deleted from the local store only.
    pub async fn delete_media(self: &Arc<Self>, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.items();
        if !current.iter().any(|m| m.id == id) {
            return Err(Error::NotFound(format!("Media item {}", id)));
        }
        let remaining: Vec<MediaItem> = current.into_iter().filter(|m| m.id != id).collect();

        if self.selector.is_remote() && !is_local_id(id) {
            self.publish(remaining);

            let repo = Arc::clone(self);
            let remote = self.selector.active();
            let id = id.to_string();
            tokio::spawn(async move {
                if let Err(e) = remote.delete(Collection::Media, &id).await {
                    warn!("Remote delete of {} failed: {}", id, e);
                    repo.selector.fall_back(&format!("media delete failed: {}", e));
                    let _guard = repo.write_lock.lock().await;
                    let remaining: Vec<MediaItem> =
                        repo.items().into_iter().filter(|m| m.id != id).collect();
                    if let Err(e) = repo.persist_locally(&remaining).await {
                        warn!("Local re-apply of delete failed: {}", e);
                    }
                }
            });
            return Ok(());
        }

        if self.selector.is_remote() {
            return self.persist_locally(&remaining).await;
        }

        self.selector.local().delete(Collection::Media, id).await?;
        self.reload_local().await
    }

    /// Swap the item at `index` with its neighbour in `direction`
    ///
    /// Moving the first item up or the last item down is a no-op.
    pub async fn reorder_media(self: &Arc<Self>, index: usize, direction: Direction) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.items();
        if index >= items.len() {
            return Err(Error::InvalidInput(format!(
                "Reorder index {} out of range for {} items",
                index,
                items.len()
            )));
        }

        let swap_index = match direction {
            Direction::Up if index == 0 => return Ok(()),
            Direction::Down if index == items.len() - 1 => return Ok(()),
            Direction::Up => index - 1,
            Direction::Down => index + 1,
        };

        let order = items[index].order;
        items[index].order = items[swap_index].order;
        items[swap_index].order = order;
        items.swap(index, swap_index);

        if self.selector.is_remote() && !items[0].is_local() {
            let writes = [
                (items[index].id.clone(), items[index].order),
                (items[swap_index].id.clone(), items[swap_index].order),
            ];
            self.publish(items);

            let repo = Arc::clone(self);
            let remote = self.selector.active();
            tokio::spawn(async move {
                for (id, order) in writes {
                    let mut doc = Map::new();
                    doc.insert("order".to_string(), Value::from(order));
                    if let Err(e) = remote.write(Collection::Media, &id, doc, WriteMode::Merge).await {
                        warn!("Remote reorder of {} failed, not rolled back: {}", id, e);
                        repo.selector.fall_back(&format!("media reorder failed: {}", e));
                        return;
                    }
                }
            });
            return Ok(());
        }

        self.persist_locally(&items).await
    }

    /// Delete everything
    ///
    /// The remote batch (remote ids only) is attempted first. Whatever its
    /// outcome, the local store and the observable playlist end up empty.
    pub async fn clear_all_media(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self.selector.is_remote() {
            let ids: Vec<String> = self
                .items()
                .into_iter()
                .filter(|m| !m.is_local())
                .map(|m| m.id)
                .collect();
            if let Err(e) = self
                .selector
                .active()
                .batch_delete(Collection::Media, &ids)
                .await
            {
                warn!("Remote clear failed: {}", e);
                self.selector.fall_back(&format!("media clear failed: {}", e));
            }
        }

        self.reserved_order.store(0, Ordering::Release);
        self.publish(Vec::new());
        info!("Playlist cleared");
        self.selector
            .local()
            .write_all(Collection::Media, Vec::new())
            .await
    }
}

impl Drop for PlaylistRepository {
    fn drop(&mut self) {
        self.set_listener(None);
    }
}

/// Apply remote pushes until the subscription ends or the backend switches
async fn listen(
    repo: Weak<PlaylistRepository>,
    mut subscription: Subscription,
    mut kind_rx: watch::Receiver<BackendKind>,
) {
    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(repo) = repo.upgrade() else { return };
                if !repo.selector.is_remote() {
                    return;
                }
                match event {
                    Some(SubscriptionEvent::Snapshot(snapshot)) => {
                        let items = media_from_snapshot(&snapshot);
                        debug!("Remote playlist snapshot with {} items", items.len());
                        repo.publish(items);
                    }
                    Some(SubscriptionEvent::Error(reason)) => {
                        repo.selector.fall_back(&format!("media listener failed: {}", reason));
                        if let Err(e) = repo.reload_local().await {
                            warn!("Failed to load local playlist: {}", e);
                        }
                        return;
                    }
                    None => {
                        repo.selector.fall_back("media listener closed");
                        if let Err(e) = repo.reload_local().await {
                            warn!("Failed to load local playlist: {}", e);
                        }
                        return;
                    }
                }
            }
            changed = kind_rx.changed() => {
                if changed.is_err() || *kind_rx.borrow() == BackendKind::Local {
                    debug!("Media listener stopping after backend switch");
                    return;
                }
            }
        }
    }
}

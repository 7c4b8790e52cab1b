//! In-memory stand-in for the remote realtime backend
//!
//! Pushes a fresh snapshot to every listener after each successful write,
//! and lets tests inject write and subscribe failures.

use async_trait::async_trait;
use serde_json::{Map, Value};
use signage_player::error::{Error, Result};
use signage_player::store::{
    sort_records_by_order, BackendKind, Collection, Record, Snapshot, StoreAdapter,
    Subscription, SubscriptionEvent, WriteMode,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MockRemoteStore {
    docs: Mutex<HashMap<Collection, BTreeMap<String, Map<String, Value>>>>,
    listeners: Mutex<Vec<(Collection, mpsc::Sender<SubscriptionEvent>)>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
    fail_subscribe: AtomicBool,
    /// One line per successful write, e.g. `write media/doc-1 Merge`
    log: Mutex<Vec<String>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Seed a document without notifying listeners
    pub fn seed(&self, collection: Collection, id: &str, data: Map<String, Value>) {
        self.docs
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .insert(id.to_string(), data);
    }

    pub fn snapshot(&self, collection: Collection) -> Snapshot {
        let docs = self.docs.lock().unwrap();
        let mut snapshot: Snapshot = docs
            .get(&collection)
            .map(|c| {
                c.iter()
                    .map(|(id, data)| Record::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        if collection == Collection::Media {
            sort_records_by_order(&mut snapshot);
        }
        snapshot
    }

    /// Break every listener of `collection`
    pub fn push_error(&self, collection: Collection, reason: &str) {
        let listeners = self.listeners.lock().unwrap();
        for (c, tx) in listeners.iter() {
            if *c == collection {
                let _ = tx.try_send(SubscriptionEvent::Error(reason.to_string()));
            }
        }
    }

    fn notify(&self, collection: Collection) {
        let snapshot = self.snapshot(collection);
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|(_, tx)| !tx.is_closed());
        for (c, tx) in listeners.iter() {
            if *c == collection {
                let _ = tx.try_send(SubscriptionEvent::Snapshot(snapshot.clone()));
            }
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Remote("injected write failure".to_string()));
        }
        Ok(())
    }

    fn record(&self, line: String) {
        self.log.lock().unwrap().push(line);
    }
}

#[async_trait]
impl StoreAdapter for MockRemoteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn read(&self, collection: Collection) -> Result<Snapshot> {
        Ok(self.snapshot(collection))
    }

    async fn subscribe(&self, collection: Collection) -> Result<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::Remote("injected subscribe failure".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        let _ = tx.try_send(SubscriptionEvent::Snapshot(self.snapshot(collection)));
        self.listeners.lock().unwrap().push((collection, tx));
        Ok(Subscription::from_receiver(rx))
    }

    async fn create(&self, collection: Collection, data: Map<String, Value>) -> Result<String> {
        self.check_writable()?;
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.seed(collection, &id, data);
        self.record(format!("create {}/{}", collection, id));
        self.notify(collection);
        Ok(id)
    }

    async fn write(
        &self,
        collection: Collection,
        id: &str,
        data: Map<String, Value>,
        mode: WriteMode,
    ) -> Result<()> {
        self.check_writable()?;
        {
            let mut docs = self.docs.lock().unwrap();
            let stored = docs
                .entry(collection)
                .or_default()
                .entry(id.to_string())
                .or_default();
            match mode {
                WriteMode::Merge => stored.extend(data),
                WriteMode::Replace => *stored = data,
            }
        }
        self.record(format!("write {}/{} {:?}", collection, id, mode));
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.check_writable()?;
        if let Some(c) = self.docs.lock().unwrap().get_mut(&collection) {
            c.remove(id);
        }
        self.record(format!("delete {}/{}", collection, id));
        self.notify(collection);
        Ok(())
    }

    async fn batch_delete(&self, collection: Collection, ids: &[String]) -> Result<()> {
        self.check_writable()?;
        if let Some(c) = self.docs.lock().unwrap().get_mut(&collection) {
            for id in ids {
                c.remove(id);
            }
        }
        self.record(format!("batch_delete {} {}", collection, ids.len()));
        self.notify(collection);
        Ok(())
    }

    async fn write_all(&self, collection: Collection, snapshot: Snapshot) -> Result<()> {
        self.check_writable()?;
        {
            let mut docs = self.docs.lock().unwrap();
            let c = docs.entry(collection).or_default();
            c.clear();
            for record in snapshot {
                c.insert(record.id, record.data);
            }
        }
        self.record(format!("write_all {}", collection));
        self.notify(collection);
        Ok(())
    }

    async fn sign_in(&self) -> Result<String> {
        Ok("remote-uid-1".to_string())
    }
}

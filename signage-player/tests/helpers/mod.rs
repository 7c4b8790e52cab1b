//! Shared test helpers for signage-player integration tests

#![allow(dead_code)]

pub mod mock_remote;

pub use mock_remote::MockRemoteStore;

use async_trait::async_trait;
use serde_json::{Map, Value};
use signage_common::events::EventBus;
use signage_common::{MediaItem, MediaKind};
use signage_player::error::Result;
use signage_player::playback::Preloader;
use signage_player::store::{LocalStore, StoreAdapter, StoreSelector};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// JSON object literal as a store document
pub fn doc(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

pub fn media_doc(url: &str, kind: &str, duration: u32, order: i64) -> Map<String, Value> {
    doc(serde_json::json!({
        "url": url,
        "type": kind,
        "duration": duration,
        "order": order,
    }))
}

pub fn item(id: &str, kind: MediaKind, duration: u32, order: i64) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        url: format!("https://cdn.example/{}", id),
        kind,
        duration,
        order,
        created_at: None,
    }
}

/// Poll `cond` every 10ms for up to two seconds
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Selector with only an in-memory local store
pub async fn local_selector(events: &EventBus) -> Arc<StoreSelector> {
    let local = LocalStore::open_in_memory("test-app")
        .await
        .expect("in-memory store");
    Arc::new(StoreSelector::new(None, Arc::new(local), events.clone()))
}

/// Selector starting on `remote`, with an in-memory local fallback
pub async fn remote_selector(
    remote: Arc<MockRemoteStore>,
    events: &EventBus,
) -> (Arc<StoreSelector>, Arc<dyn StoreAdapter>) {
    let local: Arc<dyn StoreAdapter> = Arc::new(
        LocalStore::open_in_memory("test-app")
            .await
            .expect("in-memory store"),
    );
    let remote: Arc<dyn StoreAdapter> = remote;
    let selector = Arc::new(StoreSelector::new(
        Some(remote),
        Arc::clone(&local),
        events.clone(),
    ));
    (selector, local)
}

/// Preloader that remembers every URL it was asked for
#[derive(Default)]
pub struct RecordingPreloader {
    urls: Mutex<Vec<String>>,
}

impl RecordingPreloader {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Preloader for RecordingPreloader {
    async fn preload(&self, url: &str) -> Result<()> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

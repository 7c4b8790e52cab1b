//! Settings repository
//!
//! Holds the display settings singleton. Remote saves are merge writes;
//! local saves overwrite the stored record with the union of the previous
//! and new fields. Saves are awaited so a failure reaches the operator.

use crate::error::Result;
use crate::store::{
    BackendKind, Collection, Snapshot, StoreSelector, Subscription, SubscriptionEvent, WriteMode,
    SETTINGS_DOC_ID,
};
use chrono::Utc;
use signage_common::events::{EventBus, SignageEvent};
use signage_common::{AppSettings, SettingsPatch};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SettingsRepository {
    selector: Arc<StoreSelector>,
    events: EventBus,
    settings_tx: watch::Sender<AppSettings>,
    write_lock: Mutex<()>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Settings patch held by a snapshot, if the singleton exists
fn settings_patch(snapshot: &Snapshot) -> Option<SettingsPatch> {
    let record = snapshot.iter().find(|r| r.id == SETTINGS_DOC_ID)?;
    match SettingsPatch::from_document(&record.data) {
        Ok(patch) => Some(patch),
        Err(e) => {
            warn!("Ignoring malformed settings document: {}", e);
            None
        }
    }
}

impl SettingsRepository {
    pub fn new(selector: Arc<StoreSelector>, events: EventBus) -> Arc<Self> {
        let (settings_tx, _) = watch::channel(AppSettings::default());
        Arc::new(Self {
            selector,
            events,
            settings_tx,
            write_lock: Mutex::new(()),
            listener: std::sync::Mutex::new(None),
        })
    }

    /// Load initial state and, on the remote backend, start listening
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.selector.is_remote() {
            match self.selector.active().subscribe(Collection::Settings).await {
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
                        .fall_back(&format!("settings subscription failed: {}", e));
                }
            }
        }
        self.reload_local().await
    }

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

    pub fn settings(&self) -> AppSettings {
        self.settings_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppSettings> {
        self.settings_tx.subscribe()
    }

    fn publish(&self, settings: AppSettings) {
        self.settings_tx.send_replace(settings.clone());
        self.events.emit_lossy(SignageEvent::SettingsChanged {
            settings,
            timestamp: Utc::now(),
        });
    }

    /// Replace state with the local record, or defaults when none is stored
    pub async fn reload_local(&self) -> Result<()> {
        let snapshot = match self.selector.local().read(Collection::Settings).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Local settings unreadable, using defaults: {}", e);
                Vec::new()
            }
        };
        let settings = match settings_patch(&snapshot) {
            Some(patch) => AppSettings::default().merged(&patch),
            None => AppSettings::default(),
        };
        self.publish(settings);
        Ok(())
    }

    /// Save `patch`, returning the backend the save landed on
    ///
    /// A remote failure falls back and saves locally. A local failure is
    /// returned.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<BackendKind> {
        let _guard = self.write_lock.lock().await;

        if patch.is_empty() {
            debug!("Empty settings patch, nothing to save");
            return Ok(self.selector.kind());
        }

        if self.selector.is_remote() {
            let doc = patch.to_document()?;
            match self
                .selector
                .active()
                .write(Collection::Settings, SETTINGS_DOC_ID, doc, WriteMode::Merge)
                .await
            {
                Ok(()) => {
                    debug!("Settings saved remotely");
                    return Ok(BackendKind::Remote);
                }
                Err(e) => {
                    warn!("Remote settings save failed: {}", e);
                    self.selector
                        .fall_back(&format!("settings save failed: {}", e));
                }
            }
        }

        let union = self.settings().merged(&patch);
        let doc = SettingsPatch::from(union.clone()).to_document()?;
        self.selector
            .local()
            .write(Collection::Settings, SETTINGS_DOC_ID, doc, WriteMode::Replace)
            .await?;
        self.publish(union);
        info!("Settings saved locally");
        Ok(BackendKind::Local)
    }

    /// Save the factory defaults
    pub async fn reset_settings(&self) -> Result<BackendKind> {
        self.update_settings(SettingsPatch::from(AppSettings::default()))
            .await
    }
}

impl Drop for SettingsRepository {
    fn drop(&mut self) {
        self.set_listener(None);
    }
}

async fn listen(
    repo: Weak<SettingsRepository>,
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
                        if let Some(patch) = settings_patch(&snapshot) {
                            let merged = repo.settings().merged(&patch);
                            repo.publish(merged);
                        }
                    }
                    Some(SubscriptionEvent::Error(reason)) => {
                        repo.selector.fall_back(&format!("settings listener failed: {}", reason));
                        if let Err(e) = repo.reload_local().await {
                            warn!("Failed to load local settings: {}", e);
                        }
                        return;
                    }
                    None => {
                        repo.selector.fall_back("settings listener closed");
                        if let Err(e) = repo.reload_local().await {
                            warn!("Failed to load local settings: {}", e);
                        }
                        return;
                    }
                }
            }
            changed = kind_rx.changed() => {
                if changed.is_err() || *kind_rx.borrow() == BackendKind::Local {
                    debug!("Settings listener stopping after backend switch");
                    return;
                }
            }
        }
    }
}

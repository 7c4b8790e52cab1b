//! Backend selection and permanent fallback

use super::{BackendKind, LocalStore, RemoteStore, StoreAdapter};
use crate::error::Result;
use chrono::Utc;
use signage_common::config::TomlConfig;
use signage_common::events::{EventBus, SignageEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Holds both adapters and decides which one serves requests
///
/// Starts on the remote adapter when one is configured. The first failure
/// reported through [`StoreSelector::fall_back`] switches to the local
/// adapter for the rest of the process; there is no way back.
pub struct StoreSelector {
    remote: Option<Arc<dyn StoreAdapter>>,
    local: Arc<dyn StoreAdapter>,
    kind_tx: watch::Sender<BackendKind>,
    events: EventBus,
}

impl StoreSelector {
    pub fn new(
        remote: Option<Arc<dyn StoreAdapter>>,
        local: Arc<dyn StoreAdapter>,
        events: EventBus,
    ) -> Self {
        let initial = if remote.is_some() {
            BackendKind::Remote
        } else {
            BackendKind::Local
        };
        let (kind_tx, _) = watch::channel(initial);
        Self {
            remote,
            local,
            kind_tx,
            events,
        }
    }

    /// Capability probe over the loaded configuration
    pub fn from_config(config: &TomlConfig, db: SqlitePool, events: EventBus) -> Self {
        let local: Arc<dyn StoreAdapter> = Arc::new(LocalStore::new(db, config.app_id.clone()));

        let remote: Option<Arc<dyn StoreAdapter>> = if config.remote.is_valid() {
            match RemoteStore::new(&config.remote, config.app_id.clone()) {
                Ok(store) => {
                    info!("Using remote backend at {}", config.remote.base_url);
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!("Remote backend unusable, using local backend: {}", e);
                    None
                }
            }
        } else {
            info!("No valid remote configuration, using local backend");
            None
        };

        Self::new(remote, local, events)
    }

    /// Backend currently serving requests
    pub fn kind(&self) -> BackendKind {
        *self.kind_tx.borrow()
    }

    pub fn is_remote(&self) -> bool {
        self.kind() == BackendKind::Remote
    }

    /// Watch backend switches
    pub fn subscribe_kind(&self) -> watch::Receiver<BackendKind> {
        self.kind_tx.subscribe()
    }

    /// Adapter currently serving requests
    pub fn active(&self) -> Arc<dyn StoreAdapter> {
        match (&self.remote, self.kind()) {
            (Some(remote), BackendKind::Remote) => Arc::clone(remote),
            _ => Arc::clone(&self.local),
        }
    }

    /// The always-available local adapter
    pub fn local(&self) -> Arc<dyn StoreAdapter> {
        Arc::clone(&self.local)
    }

    /// Abandon the remote backend for the rest of the session
    ///
    /// Returns true only for the call that performed the switch.
    pub fn fall_back(&self, reason: &str) -> bool {
        let switched = self.kind_tx.send_if_modified(|kind| {
            if *kind == BackendKind::Remote {
                *kind = BackendKind::Local;
                true
            } else {
                false
            }
        });

        if switched {
            warn!("Falling back to local backend: {}", reason);
            self.events.emit_lossy(SignageEvent::BackendFallback {
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        }
        switched
    }

    /// Caller identity from the active backend
    pub async fn sign_in(&self) -> Result<String> {
        self.active().sign_in().await
    }
}

//! Caller identity
//!
//! Established once per process, used for display and audit only.

use crate::store::{BackendKind, StoreSelector, OFFLINE_DEMO_UID};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Uid reported when the remote sign-in fails
pub const OFFLINE_FALLBACK_UID: &str = "offline-fallback";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    /// Backend active when the identity was established
    pub backend: BackendKind,
}

impl Identity {
    /// Sign in against the active backend
    ///
    /// Never fails: a remote sign-in error yields the fallback uid and
    /// leaves backend selection to the subscriptions.
    pub async fn establish(selector: &StoreSelector) -> Self {
        let backend = selector.kind();
        let uid = match backend {
            BackendKind::Local => OFFLINE_DEMO_UID.to_string(),
            BackendKind::Remote => match selector.sign_in().await {
                Ok(uid) => uid,
                Err(e) => {
                    warn!("Remote sign-in failed: {}", e);
                    OFFLINE_FALLBACK_UID.to_string()
                }
            },
        };
        info!("Session identity: {} ({})", uid, backend);
        Self { uid, backend }
    }
}

//! # Signage Player Library (signage-player)
//!
//! Playback scheduling and data synchronization for an unattended signage
//! display.
//!
//! **Purpose:** Keep a media playlist and display settings in sync with a
//! remote realtime store (falling back to a local SQLite store), rotate the
//! playlist on screen, cycle a background audio playlist, and expose all of
//! it to the rendering client over HTTP and SSE.
//!
//! **Architecture:** store adapters → repositories (watch channels) →
//! scheduler drivers (one tokio task each) → HTTP/SSE API

pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod playback;
pub mod repository;
pub mod session;
pub mod store;

pub use error::{Error, Result};

use api::AppContext;
use identity::Identity;
use playback::{EventAudioOutputFactory, Preloader, VisualTiming};
use repository::{PlaylistRepository, SettingsRepository};
use session::SessionController;
use signage_common::events::EventBus;
use signage_common::model::ViewMode;
use std::sync::Arc;
use store::StoreSelector;
use tracing::info;

/// Wire repositories, identity and the viewing session over a selector
///
/// Loads initial playlist and settings (subscribing when remote) and enters
/// `start_mode`.
pub async fn assemble(
    selector: Arc<StoreSelector>,
    events: EventBus,
    timing: VisualTiming,
    preloader: Arc<dyn Preloader>,
    start_mode: ViewMode,
) -> Result<AppContext> {
    let identity = Identity::establish(&selector).await;

    let playlist = PlaylistRepository::new(Arc::clone(&selector), events.clone());
    playlist.start().await?;
    let settings = SettingsRepository::new(Arc::clone(&selector), events.clone());
    settings.start().await?;
    info!(
        "Loaded {} media items from {} backend",
        playlist.items().len(),
        selector.kind()
    );

    let session = Arc::new(SessionController::new(
        Arc::clone(&playlist),
        Arc::clone(&settings),
        events.clone(),
        timing,
        preloader,
        Arc::new(EventAudioOutputFactory::new(events.clone())),
    ));
    session.enter(start_mode).await;

    Ok(AppContext {
        selector,
        playlist,
        settings,
        session,
        identity,
        events,
    })
}

//! HTTP server setup and routing
//!
//! Sets up the Axum router for the control endpoints and the SSE stream.

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::repository::{PlaylistRepository, SettingsRepository};
use crate::session::SessionController;
use crate::store::StoreSelector;
use axum::{
    routing::{delete, get, post},
    Router,
};
use signage_common::events::EventBus;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{handlers, sse};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub selector: Arc<StoreSelector>,
    pub playlist: Arc<PlaylistRepository>,
    pub settings: Arc<SettingsRepository>,
    pub session: Arc<SessionController>,
    pub identity: Identity,
    pub events: EventBus,
}

/// Build the router with all routes under `/api/v1`
pub fn create_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/identity", get(handlers::get_identity))
        // Playlist
        .route(
            "/media",
            get(handlers::list_media)
                .post(handlers::add_media)
                .delete(handlers::clear_media),
        )
        .route("/media/reorder", post(handlers::reorder_media))
        .route("/media/:id", delete(handlers::delete_media))
        // Settings
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/settings/reset", post(handlers::reset_settings))
        // Visual scheduler
        .route("/playback", get(handlers::get_playback))
        .route("/playback/ended", post(handlers::playback_ended))
        .route("/playback/error", post(handlers::playback_error))
        .route("/playback/retry", post(handlers::playback_retry))
        .route("/playback/skip", post(handlers::playback_skip))
        // Audio scheduler
        .route("/audio", get(handlers::get_audio))
        .route("/audio/ended", post(handlers::audio_ended))
        .route("/audio/error", post(handlers::audio_error))
        .route("/audio/shuffle", post(handlers::audio_shuffle))
        .route("/audio/mute", post(handlers::audio_mute))
        .route("/audio/interact", post(handlers::audio_interact))
        .route(
            "/audio/analysis",
            get(handlers::get_analysis).post(handlers::post_analysis),
        )
        // Viewing session
        .route("/view", get(handlers::get_view).post(handlers::set_view))
        // SSE event stream
        .route("/events", get(sse::event_stream));

    Router::new()
        .nest("/api/v1", api)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run<F>(addr: SocketAddr, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}

//! HTTP request handlers
//!
//! Thin adapters from JSON requests to repository, scheduler and session
//! operations. Errors map to status codes in one place.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::identity::Identity;
use crate::playback::{AudioControl, MediaError, Spectrum, VisualCommand};
use crate::repository::Direction;
use crate::session::SessionInfo;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use signage_common::events::{AudioSnapshot, VisualSnapshot};
use signage_common::model::{BackendKind, ViewMode};
use signage_common::{AppSettings, MediaItem, MediaKind, SettingsPatch};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    backend: BackendKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MediaListResponse {
    items: Vec<MediaItem>,
    backend: BackendKind,
}

#[derive(Debug, Deserialize)]
pub struct AddMediaRequest {
    url: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    duration: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    index: usize,
    direction: Direction,
}

/// Result of a playlist mutation
///
/// `backend` tells whether the change is already authoritative (local) or
/// awaiting the next remote snapshot.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    status: String,
    backend: BackendKind,
}

#[derive(Debug, Serialize)]
pub struct SettingsSaveResponse {
    backend: BackendKind,
    settings: AppSettings,
}

#[derive(Debug, Deserialize)]
pub struct MediaEndedRequest {
    item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaErrorRequest {
    item_id: String,
    /// Element error code; absent for a plain load failure
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaybackAck {
    accepted: bool,
    snapshot: VisualSnapshot,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    fft_size: usize,
    frequency_bin_count: usize,
    spectrum: Spectrum,
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    mode: ViewMode,
}

pub type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        Error::Remote(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (
        status,
        Json(StatusResponse {
            status: "error".to_string(),
            message: Some(e.to_string()),
        }),
    )
}

fn mutation_response(ctx: &AppContext) -> (StatusCode, Json<MutationResponse>) {
    let backend = ctx.selector.kind();
    let (code, status) = match backend {
        BackendKind::Remote => (StatusCode::ACCEPTED, "accepted"),
        BackendKind::Local => (StatusCode::OK, "ok"),
    };
    (
        code,
        Json(MutationResponse {
            status: status.to_string(),
            backend,
        }),
    )
}

// ============================================================================
// Health / Identity
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "signage-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: ctx.selector.kind(),
    })
}

/// GET /identity
pub async fn get_identity(State(ctx): State<AppContext>) -> Json<Identity> {
    Json(ctx.identity.clone())
}

// ============================================================================
// Playlist
// ============================================================================

/// GET /media - sorted playlist
pub async fn list_media(State(ctx): State<AppContext>) -> Json<MediaListResponse> {
    Json(MediaListResponse {
        items: ctx.playlist.items(),
        backend: ctx.selector.kind(),
    })
}

/// POST /media
pub async fn add_media(
    State(ctx): State<AppContext>,
    Json(req): Json<AddMediaRequest>,
) -> Result<(StatusCode, Json<MutationResponse>), ApiError> {
    let kind: MediaKind = req.kind.parse().map_err(|e: signage_common::Error| api_error(e.into()))?;
    ctx.playlist
        .add_media(&req.url, kind, req.duration)
        .await
        .map_err(api_error)?;
    info!("Added {} item {}", kind, req.url);
    Ok(mutation_response(&ctx))
}

/// DELETE /media/:id
pub async fn delete_media(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MutationResponse>), ApiError> {
    ctx.playlist.delete_media(&id).await.map_err(api_error)?;
    info!("Deleted media item {}", id);
    Ok(mutation_response(&ctx))
}

/// POST /media/reorder
pub async fn reorder_media(
    State(ctx): State<AppContext>,
    Json(req): Json<ReorderRequest>,
) -> Result<(StatusCode, Json<MutationResponse>), ApiError> {
    ctx.playlist
        .reorder_media(req.index, req.direction)
        .await
        .map_err(api_error)?;
    Ok(mutation_response(&ctx))
}

/// DELETE /media - clear the playlist
pub async fn clear_media(
    State(ctx): State<AppContext>,
) -> Result<(StatusCode, Json<MutationResponse>), ApiError> {
    ctx.playlist.clear_all_media().await.map_err(api_error)?;
    Ok((
        StatusCode::OK,
        Json(MutationResponse {
            status: "ok".to_string(),
            backend: ctx.selector.kind(),
        }),
    ))
}

// ============================================================================
// Settings
// ============================================================================

/// GET /settings
pub async fn get_settings(State(ctx): State<AppContext>) -> Json<AppSettings> {
    Json(ctx.settings.settings())
}

/// PUT /settings - partial update
pub async fn update_settings(
    State(ctx): State<AppContext>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SettingsSaveResponse>, ApiError> {
    let backend = ctx.settings.update_settings(patch).await.map_err(api_error)?;
    Ok(Json(SettingsSaveResponse {
        backend,
        settings: ctx.settings.settings(),
    }))
}

/// POST /settings/reset
pub async fn reset_settings(
    State(ctx): State<AppContext>,
) -> Result<Json<SettingsSaveResponse>, ApiError> {
    let backend = ctx.settings.reset_settings().await.map_err(api_error)?;
    Ok(Json(SettingsSaveResponse {
        backend,
        settings: ctx.settings.settings(),
    }))
}

// ============================================================================
// Visual Scheduler
// ============================================================================

/// GET /playback
pub async fn get_playback(
    State(ctx): State<AppContext>,
) -> Result<Json<VisualSnapshot>, ApiError> {
    ctx.session.visual_snapshot().await.map(Json).map_err(api_error)
}

async fn visual(ctx: &AppContext, command: VisualCommand) -> Result<Json<PlaybackAck>, ApiError> {
    let accepted = ctx.session.visual_command(command).await.map_err(api_error)?;
    let snapshot = ctx.session.visual_snapshot().await.map_err(api_error)?;
    Ok(Json(PlaybackAck { accepted, snapshot }))
}

/// POST /playback/ended - natural end of the shown video/audio item
pub async fn playback_ended(
    State(ctx): State<AppContext>,
    Json(req): Json<MediaEndedRequest>,
) -> Result<Json<PlaybackAck>, ApiError> {
    visual(&ctx, VisualCommand::MediaEnded { item_id: req.item_id }).await
}

/// POST /playback/error - shown item failed to load or decode
pub async fn playback_error(
    State(ctx): State<AppContext>,
    Json(req): Json<MediaErrorRequest>,
) -> Result<Json<PlaybackAck>, ApiError> {
    let error = match req.code {
        Some(code) => MediaError::Decode {
            code,
            message: req.message.unwrap_or_default(),
        },
        None => MediaError::LoadFailed,
    };
    visual(
        &ctx,
        VisualCommand::MediaError {
            item_id: req.item_id,
            error,
        },
    )
    .await
}

/// POST /playback/retry
pub async fn playback_retry(State(ctx): State<AppContext>) -> Result<Json<PlaybackAck>, ApiError> {
    visual(&ctx, VisualCommand::Retry).await
}

/// POST /playback/skip
pub async fn playback_skip(State(ctx): State<AppContext>) -> Result<Json<PlaybackAck>, ApiError> {
    visual(&ctx, VisualCommand::ForceSkip).await
}

// ============================================================================
// Audio Scheduler
// ============================================================================

/// GET /audio
pub async fn get_audio(State(ctx): State<AppContext>) -> Result<Json<AudioSnapshot>, ApiError> {
    ctx.session.audio_snapshot().await.map(Json).map_err(api_error)
}

async fn audio(ctx: &AppContext, control: AudioControl) -> Result<Json<AudioSnapshot>, ApiError> {
    ctx.session
        .audio_control(control)
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /audio/ended
pub async fn audio_ended(State(ctx): State<AppContext>) -> Result<Json<AudioSnapshot>, ApiError> {
    audio(&ctx, AudioControl::TrackEnded).await
}

/// POST /audio/error
pub async fn audio_error(State(ctx): State<AppContext>) -> Result<Json<AudioSnapshot>, ApiError> {
    audio(&ctx, AudioControl::TrackError).await
}

/// POST /audio/shuffle
pub async fn audio_shuffle(State(ctx): State<AppContext>) -> Result<Json<AudioSnapshot>, ApiError> {
    audio(&ctx, AudioControl::ToggleShuffle).await
}

/// POST /audio/mute
pub async fn audio_mute(State(ctx): State<AppContext>) -> Result<Json<AudioSnapshot>, ApiError> {
    audio(&ctx, AudioControl::ToggleMute).await
}

/// POST /audio/interact - user gesture on the display
pub async fn audio_interact(
    State(ctx): State<AppContext>,
) -> Result<Json<AudioSnapshot>, ApiError> {
    audio(&ctx, AudioControl::Interact).await
}

/// GET /audio/analysis - latest analyser frame
pub async fn get_analysis(
    State(ctx): State<AppContext>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let tap = ctx
        .session
        .audio_analysis()
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(Error::NotFound("audio output not created yet".to_string())))?;
    Ok(Json(AnalysisResponse {
        fft_size: tap.fft_size(),
        frequency_bin_count: tap.frequency_bin_count(),
        spectrum: tap.read(),
    }))
}

/// POST /audio/analysis - renderer feeds a new frame
pub async fn post_analysis(
    State(ctx): State<AppContext>,
    Json(spectrum): Json<Spectrum>,
) -> Result<StatusCode, ApiError> {
    let tap = ctx
        .session
        .audio_analysis()
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(Error::NotFound("audio output not created yet".to_string())))?;
    tap.update(spectrum).map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Viewing Session
// ============================================================================

/// GET /view
pub async fn get_view(State(ctx): State<AppContext>) -> Json<SessionInfo> {
    Json(ctx.session.info().await)
}

/// POST /view - switch between public rotation and administration
pub async fn set_view(
    State(ctx): State<AppContext>,
    Json(req): Json<ViewRequest>,
) -> Json<SessionInfo> {
    Json(ctx.session.enter(req.mode).await)
}

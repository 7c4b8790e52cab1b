//! Event types for the signage event system
//!
//! Provides the shared event definitions, the scheduler snapshots carried by
//! them, and the `EventBus` used to fan events out to SSE clients.

use crate::model::{AppSettings, BackendKind, MediaItem, ViewMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Phase of the visual playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualPhase {
    /// Playlist empty or not yet resolved
    Loading,
    /// An item is on screen
    Showing,
    /// Brief cross-fade before the next item
    Transitioning,
    /// Current item failed to load or decode
    Errored,
}

impl std::fmt::Display for VisualPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VisualPhase::Loading => write!(f, "loading"),
            VisualPhase::Showing => write!(f, "showing"),
            VisualPhase::Transitioning => write!(f, "transitioning"),
            VisualPhase::Errored => write!(f, "errored"),
        }
    }
}

/// Read-only view of the visual scheduler for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualSnapshot {
    pub phase: VisualPhase,
    /// Cursor into the sorted playlist
    pub index: usize,
    /// Item on screen (or fading out, or errored)
    pub current: Option<MediaItem>,
    /// `index + 1 mod len`, for preview and preloading
    pub next: Option<MediaItem>,
    /// Presentation hint: apply the cross-fade
    pub transition_pending: bool,
    /// Media element must start muted (always true for video)
    pub start_muted: bool,
    /// Coarse failure classification while errored
    pub error: Option<String>,
    /// Bumped every time an item instance is (re)shown
    pub instance: u64,
}

impl VisualSnapshot {
    /// Snapshot of a scheduler with nothing to show
    pub fn loading() -> Self {
        Self {
            phase: VisualPhase::Loading,
            index: 0,
            current: None,
            next: None,
            transition_pending: false,
            start_muted: false,
            error: None,
            instance: 0,
        }
    }
}

/// Read-only view of the background audio scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSnapshot {
    pub tracks: Vec<String>,
    pub index: usize,
    pub current_track: Option<String>,
    pub shuffle: bool,
    pub muted: bool,
    /// Output resource exists (first interaction or unmute happened)
    pub output_active: bool,
}

impl AudioSnapshot {
    /// Snapshot with no tracks and no output
    pub fn idle() -> Self {
        Self {
            tracks: Vec::new(),
            index: 0,
            current_track: None,
            shuffle: false,
            muted: false,
            output_active: false,
        }
    }
}

/// Instruction for the client that owns the physical audio element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum AudioCommand {
    /// Point the element at a new source
    Load { url: String },
    Play,
    Pause,
    /// Drop the element and its analysis graph
    Release,
}

/// Signage event types
///
/// Events are broadcast via `EventBus` and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignageEvent {
    /// Observable playlist changed (push, local write or optimistic update)
    PlaylistChanged {
        items: Vec<MediaItem>,
        backend: BackendKind,
        timestamp: DateTime<Utc>,
    },

    /// Settings record changed
    SettingsChanged {
        settings: AppSettings,
        timestamp: DateTime<Utc>,
    },

    /// Visual scheduler moved
    VisualStateChanged {
        snapshot: VisualSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Audio scheduler moved
    AudioStateChanged {
        snapshot: AudioSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Audio element instruction for the renderer
    AudioOutputCommand {
        command: AudioCommand,
        timestamp: DateTime<Utc>,
    },

    /// Remote backend abandoned for the rest of the session
    BackendFallback {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Display switched between public rotation and administration
    ViewModeChanged {
        mode: ViewMode,
        timestamp: DateTime<Utc>,
    },
}

impl SignageEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SignageEvent::PlaylistChanged { .. } => "PlaylistChanged",
            SignageEvent::SettingsChanged { .. } => "SettingsChanged",
            SignageEvent::VisualStateChanged { .. } => "VisualStateChanged",
            SignageEvent::AudioStateChanged { .. } => "AudioStateChanged",
            SignageEvent::AudioOutputCommand { .. } => "AudioOutputCommand",
            SignageEvent::BackendFallback { .. } => "BackendFallback",
            SignageEvent::ViewModeChanged { .. } => "ViewModeChanged",
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`: publishing never blocks, slow subscribers
/// observe lag instead of stalling producers, and dropped receivers clean up
/// on their own.
///
/// # Examples
///
/// ```
/// use signage_common::events::{EventBus, SignageEvent};
/// use signage_common::model::ViewMode;
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(SignageEvent::ViewModeChanged {
///     mode: ViewMode::Admin,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SignageEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SignageEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SignageEvent,
    ) -> Result<usize, broadcast::error::SendError<SignageEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: SignageEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

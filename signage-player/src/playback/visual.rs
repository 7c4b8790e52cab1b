//! Visual playback state machine
//!
//! Synchronous and clock-free: every state change that needs a wake-up
//! hands out a [`TimerRequest`] whose token carries a generation number.
//! Any later transition bumps the generation, so a timer armed for an
//! earlier state is recognised as stale and ignored. This is what keeps
//! each item instance to exactly one advance.
//!
//! ```text
//! Loading ──playlist non-empty──► Showing(i)
//! Showing(i) ──duration timer / ended / skip──► Transitioning ──► Showing(i+1)
//! Showing(i) ──load/decode error──► Errored ──grace / skip──► Transitioning
//! Errored ──retry──► Showing(i)
//! ```

use serde::{Deserialize, Serialize};
use signage_common::config::PlaybackConfig;
use signage_common::events::{VisualPhase, VisualSnapshot};
use signage_common::MediaItem;
use std::time::Duration;
use tracing::debug;

/// Scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualTiming {
    /// Cross-fade length; zero advances immediately
    pub transition: Duration,
    /// Wait before auto-skipping an errored item
    pub error_grace: Duration,
    /// Display time for timed items without a duration
    pub default_image_duration: Duration,
}

impl Default for VisualTiming {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for VisualTiming {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            transition: Duration::from_millis(config.transition_ms),
            error_grace: Duration::from_millis(config.error_grace_ms),
            default_image_duration: Duration::from_secs(u64::from(
                config.default_image_duration_s,
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Display,
    ErrorGrace,
    Transition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub generation: u64,
    pub kind: TimerKind,
}

/// Wake-up the driver must deliver back through [`VisualScheduler::on_timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub token: TimerToken,
    pub after: Duration,
}

/// Coarse classification of a media failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaError {
    /// Element reported a decode error code
    Decode { code: u16, message: String },
    /// Resource never loaded (missing file, CORS)
    LoadFailed,
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::Decode { code, message } => write!(f, "CODE_{} :: {}", code, message),
            MediaError::LoadFailed => write!(f, "LOAD_FAILED :: 404_OR_CORS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VisualState {
    Loading,
    Showing(MediaItem),
    /// Outgoing item while the cross-fade runs
    Transitioning(MediaItem),
    Errored { item: MediaItem, reason: MediaError },
}

pub struct VisualScheduler {
    timing: VisualTiming,
    playlist: Vec<MediaItem>,
    index: usize,
    state: VisualState,
    generation: u64,
    pending: Option<TimerRequest>,
    instance: u64,
    preload_due: bool,
}

impl VisualScheduler {
    pub fn new(timing: VisualTiming) -> Self {
        Self {
            timing,
            playlist: Vec::new(),
            index: 0,
            state: VisualState::Loading,
            generation: 0,
            pending: None,
            instance: 0,
            preload_due: false,
        }
    }

    pub fn state(&self) -> &VisualState {
        &self.state
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Item on screen, fading out, or errored
    pub fn current(&self) -> Option<&MediaItem> {
        match &self.state {
            VisualState::Loading => None,
            VisualState::Showing(item) | VisualState::Transitioning(item) => Some(item),
            VisualState::Errored { item, .. } => Some(item),
        }
    }

    /// Item after the cursor, wrapping; the current item itself for a
    /// single-item playlist
    pub fn next_item(&self) -> Option<&MediaItem> {
        if self.playlist.is_empty() {
            return None;
        }
        self.playlist.get((self.index + 1) % self.playlist.len())
    }

    /// Timer the driver should currently have armed
    pub fn pending_timer(&self) -> Option<TimerRequest> {
        self.pending
    }

    /// Next item to fetch ahead of time, once per cursor move
    pub fn take_preload(&mut self) -> Option<MediaItem> {
        if !std::mem::take(&mut self.preload_due) || self.playlist.len() < 2 {
            return None;
        }
        self.next_item()
            .filter(|item| item.kind.is_preloadable())
            .cloned()
    }

    /// Adopt a new playlist snapshot
    ///
    /// An out-of-range cursor is clamped to 0. When the item under the
    /// cursor is no longer the one being shown, it is shown from the start.
    pub fn set_playlist(&mut self, playlist: Vec<MediaItem>) {
        self.playlist = playlist;

        if self.playlist.is_empty() {
            self.cancel_timers();
            self.index = 0;
            self.state = VisualState::Loading;
            return;
        }

        if self.index >= self.playlist.len() {
            debug!("Cursor {} out of range, clamping to 0", self.index);
            self.index = 0;
        }

        let at_cursor = &self.playlist[self.index];
        let restart = match &self.state {
            VisualState::Loading => true,
            VisualState::Showing(item) | VisualState::Errored { item, .. } => item != at_cursor,
            // The pending advance re-reads the playlist when it fires
            VisualState::Transitioning(_) => false,
        };
        if restart {
            self.show(self.index);
        } else {
            self.preload_due = true;
        }
    }

    /// Deliver a fired timer; stale tokens are ignored
    pub fn on_timer(&mut self, token: TimerToken) -> bool {
        match self.pending {
            Some(pending) if pending.token == token && token.generation == self.generation => {}
            _ => return false,
        }
        self.pending = None;

        match (token.kind, &self.state) {
            (TimerKind::Display, VisualState::Showing(_))
            | (TimerKind::ErrorGrace, VisualState::Errored { .. }) => {
                self.begin_transition();
                true
            }
            (TimerKind::Transition, VisualState::Transitioning(_)) => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    /// Natural end of a video/audio item
    pub fn media_ended(&mut self, item_id: &str) -> bool {
        match &self.state {
            VisualState::Showing(item) if item.id == item_id && !item.kind.is_timed() => {
                self.begin_transition();
                true
            }
            _ => false,
        }
    }

    /// Load/decode failure of the shown item
    pub fn media_error(&mut self, item_id: &str, reason: MediaError) -> bool {
        let item = match &self.state {
            VisualState::Showing(item) if item.id == item_id => item.clone(),
            _ => return false,
        };
        debug!("Item {} errored: {}", item.id, reason);
        self.cancel_timers();
        self.state = VisualState::Errored { item, reason };
        self.arm(TimerKind::ErrorGrace, self.timing.error_grace);
        true
    }

    /// Show the errored item again without moving the cursor
    pub fn retry(&mut self) -> bool {
        if !matches!(self.state, VisualState::Errored { .. }) {
            return false;
        }
        self.show(self.index);
        true
    }

    /// Advance now, skipping any remaining display or grace time
    pub fn force_skip(&mut self) -> bool {
        match self.state {
            VisualState::Showing(_) | VisualState::Errored { .. } => {
                self.begin_transition();
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> VisualSnapshot {
        let phase = match self.state {
            VisualState::Loading => VisualPhase::Loading,
            VisualState::Showing(_) => VisualPhase::Showing,
            VisualState::Transitioning(_) => VisualPhase::Transitioning,
            VisualState::Errored { .. } => VisualPhase::Errored,
        };
        let current = self.current().cloned();
        VisualSnapshot {
            phase,
            index: self.index,
            start_muted: current
                .as_ref()
                .map(|item| item.kind.starts_muted())
                .unwrap_or(false),
            current,
            next: self.next_item().cloned(),
            transition_pending: phase == VisualPhase::Transitioning,
            error: match &self.state {
                VisualState::Errored { reason, .. } => Some(reason.to_string()),
                _ => None,
            },
            instance: self.instance,
        }
    }

    fn cancel_timers(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.pending = Some(TimerRequest {
            token: TimerToken {
                generation: self.generation,
                kind,
            },
            after,
        });
    }

    fn show(&mut self, index: usize) {
        self.cancel_timers();
        let Some(item) = self.playlist.get(index).cloned() else {
            self.state = VisualState::Loading;
            return;
        };
        self.index = index;
        self.instance += 1;
        self.preload_due = true;

        if item.kind.is_timed() {
            let after = item.display_duration(self.timing.default_image_duration);
            self.arm(TimerKind::Display, after);
        }
        debug!("Showing {} item {} at index {}", item.kind, item.id, index);
        self.state = VisualState::Showing(item);
    }

    fn begin_transition(&mut self) {
        self.cancel_timers();
        let Some(item) = self.current().cloned() else {
            return;
        };
        self.state = VisualState::Transitioning(item);
        if self.timing.transition.is_zero() {
            self.advance();
        } else {
            self.arm(TimerKind::Transition, self.timing.transition);
        }
    }

    fn advance(&mut self) {
        if self.playlist.is_empty() {
            self.cancel_timers();
            self.state = VisualState::Loading;
            return;
        }
        let next = (self.index + 1) % self.playlist.len();
        self.show(next);
    }
}

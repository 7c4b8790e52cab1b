//! Viewing session control
//!
//! In public view both scheduler drivers run. Entering the administrative
//! view tears them down, which cancels every pending timer and releases
//! the audio output. Returning to public view starts fresh drivers from the
//! repositories' current snapshots.

use crate::error::{Error, Result};
use crate::playback::{
    AnalysisTap, AudioControl, AudioHandle, AudioOutputFactory, AudioScheduler, Preloader,
    VisualCommand, VisualHandle, VisualTiming,
};
use crate::repository::{PlaylistRepository, SettingsRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use signage_common::events::{AudioSnapshot, EventBus, SignageEvent, VisualSnapshot};
use signage_common::model::ViewMode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Current view and the id of the running viewing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub mode: ViewMode,
    /// Present while in public view
    pub session_id: Option<Uuid>,
}

struct Drivers {
    session_id: Uuid,
    visual: VisualHandle,
    audio: AudioHandle,
}

pub struct SessionController {
    playlist: Arc<PlaylistRepository>,
    settings: Arc<SettingsRepository>,
    events: EventBus,
    timing: VisualTiming,
    preloader: Arc<dyn Preloader>,
    audio_factory: Arc<dyn AudioOutputFactory>,
    drivers: Mutex<Option<Drivers>>,
}

impl SessionController {
    /// Controller in administrative view; call [`Self::enter`] to start
    pub fn new(
        playlist: Arc<PlaylistRepository>,
        settings: Arc<SettingsRepository>,
        events: EventBus,
        timing: VisualTiming,
        preloader: Arc<dyn Preloader>,
        audio_factory: Arc<dyn AudioOutputFactory>,
    ) -> Self {
        Self {
            playlist,
            settings,
            events,
            timing,
            preloader,
            audio_factory,
            drivers: Mutex::new(None),
        }
    }

    pub async fn info(&self) -> SessionInfo {
        let drivers = self.drivers.lock().await;
        match drivers.as_ref() {
            Some(d) => SessionInfo {
                mode: ViewMode::Public,
                session_id: Some(d.session_id),
            },
            None => SessionInfo {
                mode: ViewMode::Admin,
                session_id: None,
            },
        }
    }

    pub async fn mode(&self) -> ViewMode {
        self.info().await.mode
    }

    /// Switch view; switching to the current view changes nothing
    pub async fn enter(&self, mode: ViewMode) -> SessionInfo {
        let mut drivers = self.drivers.lock().await;

        let changed = match (mode, drivers.is_some()) {
            (ViewMode::Public, false) => {
                let session_id = Uuid::new_v4();
                let visual = VisualHandle::spawn(
                    self.timing,
                    self.playlist.subscribe(),
                    Arc::clone(&self.preloader),
                    self.events.clone(),
                );
                let audio = AudioHandle::spawn(
                    AudioScheduler::new(Arc::clone(&self.audio_factory)),
                    self.settings.subscribe(),
                    self.events.clone(),
                );
                *drivers = Some(Drivers {
                    session_id,
                    visual,
                    audio,
                });
                info!("Entered public view, session {}", session_id);
                true
            }
            (ViewMode::Admin, true) => {
                if let Some(old) = drivers.take() {
                    info!("Entered admin view, ending session {}", old.session_id);
                }
                true
            }
            _ => false,
        };

        if changed {
            self.events.emit_lossy(SignageEvent::ViewModeChanged {
                mode,
                timestamp: Utc::now(),
            });
        }

        SessionInfo {
            mode,
            session_id: drivers.as_ref().map(|d| d.session_id),
        }
    }

    fn not_public() -> Error {
        Error::InvalidState("playback is stopped in admin view".to_string())
    }

    pub async fn visual_snapshot(&self) -> Result<VisualSnapshot> {
        let drivers = self.drivers.lock().await;
        drivers
            .as_ref()
            .map(|d| d.visual.snapshot())
            .ok_or_else(Self::not_public)
    }

    pub async fn visual_command(&self, command: VisualCommand) -> Result<bool> {
        let drivers = self.drivers.lock().await;
        let d = drivers.as_ref().ok_or_else(Self::not_public)?;
        d.visual.send(command).await
    }

    pub async fn audio_snapshot(&self) -> Result<AudioSnapshot> {
        let drivers = self.drivers.lock().await;
        drivers
            .as_ref()
            .map(|d| d.audio.snapshot())
            .ok_or_else(Self::not_public)
    }

    pub async fn audio_control(&self, control: AudioControl) -> Result<AudioSnapshot> {
        let drivers = self.drivers.lock().await;
        let d = drivers.as_ref().ok_or_else(Self::not_public)?;
        d.audio.send(control).await
    }

    /// Analysis tap of the live audio output, if one was created
    pub async fn audio_analysis(&self) -> Result<Option<AnalysisTap>> {
        let drivers = self.drivers.lock().await;
        drivers
            .as_ref()
            .map(|d| d.audio.analysis())
            .ok_or_else(Self::not_public)
    }
}

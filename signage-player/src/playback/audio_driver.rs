//! Async driver for the audio scheduler

use super::audio::AudioScheduler;
use super::audio_output::AnalysisTap;
use crate::error::{Error, Result};
use chrono::Utc;
use signage_common::events::{AudioSnapshot, EventBus, SignageEvent};
use signage_common::AppSettings;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioControl {
    TrackEnded,
    TrackError,
    ToggleShuffle,
    ToggleMute,
    /// User gesture on the display
    Interact,
}

struct Envelope {
    control: AudioControl,
    reply: oneshot::Sender<AudioSnapshot>,
}

/// Handle to a running audio driver; dropping it stops the task and
/// releases the output
pub struct AudioHandle {
    tx: mpsc::Sender<Envelope>,
    snapshot_rx: watch::Receiver<AudioSnapshot>,
    tap_rx: watch::Receiver<Option<AnalysisTap>>,
    task: JoinHandle<()>,
}

impl AudioHandle {
    pub fn spawn(
        scheduler: AudioScheduler,
        settings_rx: watch::Receiver<AppSettings>,
        events: EventBus,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(AudioSnapshot::idle());
        let (tap_tx, tap_rx) = watch::channel(None);
        let task = tokio::spawn(run(scheduler, rx, settings_rx, snapshot_tx, tap_tx, events));
        Self {
            tx,
            snapshot_rx,
            tap_rx,
            task,
        }
    }

    /// Apply a control and return the resulting snapshot
    pub async fn send(&self, control: AudioControl) -> Result<AudioSnapshot> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope { control, reply })
            .await
            .map_err(|_| Error::InvalidState("audio driver stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::InvalidState("audio driver stopped".to_string()))
    }

    pub fn snapshot(&self) -> AudioSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AudioSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Analysis tap of the live output, once one exists
    pub fn analysis(&self) -> Option<AnalysisTap> {
        self.tap_rx.borrow().clone()
    }
}

impl Drop for AudioHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut scheduler: AudioScheduler,
    mut rx: mpsc::Receiver<Envelope>,
    mut settings_rx: watch::Receiver<AppSettings>,
    snapshot_tx: watch::Sender<AudioSnapshot>,
    tap_tx: watch::Sender<Option<AnalysisTap>>,
    events: EventBus,
) {
    let publish = |scheduler: &AudioScheduler| {
        let snapshot = scheduler.snapshot();
        tap_tx.send_replace(scheduler.analysis());
        if *snapshot_tx.borrow() != snapshot {
            debug!(
                "Audio track {} of {} (shuffle {}, muted {})",
                snapshot.index,
                snapshot.tracks.len(),
                snapshot.shuffle,
                snapshot.muted
            );
            snapshot_tx.send_replace(snapshot.clone());
            events.emit_lossy(SignageEvent::AudioStateChanged {
                snapshot,
                timestamp: Utc::now(),
            });
        }
    };

    let tracks = settings_rx.borrow_and_update().effective_audio_playlist();
    scheduler.set_tracks(tracks);
    publish(&scheduler);

    let mut settings_open = true;
    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(Envelope { control, reply }) = envelope else {
                    debug!("Audio driver command channel closed");
                    return;
                };
                match control {
                    AudioControl::TrackEnded => scheduler.track_ended(),
                    AudioControl::TrackError => scheduler.track_error(),
                    AudioControl::ToggleShuffle => {
                        scheduler.toggle_shuffle();
                    }
                    AudioControl::ToggleMute => {
                        scheduler.toggle_mute();
                    }
                    AudioControl::Interact => scheduler.interact(),
                }
                publish(&scheduler);
                let _ = reply.send(scheduler.snapshot());
            }
            changed = settings_rx.changed(), if settings_open => {
                if changed.is_err() {
                    settings_open = false;
                    continue;
                }
                let tracks = settings_rx.borrow_and_update().effective_audio_playlist();
                scheduler.set_tracks(tracks);
                publish(&scheduler);
            }
        }
    }
}

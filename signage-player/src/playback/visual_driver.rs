//! Async driver for the visual scheduler
//!
//! One task owns the [`VisualScheduler`]. It reacts to renderer commands,
//! playlist changes and its single armed deadline, then republishes the
//! snapshot when anything moved.

use super::preload::Preloader;
use super::visual::{MediaError, TimerToken, VisualScheduler, VisualTiming};
use crate::error::{Error, Result};
use chrono::Utc;
use signage_common::events::{EventBus, SignageEvent, VisualSnapshot};
use signage_common::MediaItem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Renderer feedback and operator controls
#[derive(Debug, Clone, PartialEq)]
pub enum VisualCommand {
    MediaEnded { item_id: String },
    MediaError { item_id: String, error: MediaError },
    Retry,
    ForceSkip,
}

struct Envelope {
    command: VisualCommand,
    reply: oneshot::Sender<bool>,
}

/// Handle to a running visual driver; dropping it stops the task
pub struct VisualHandle {
    tx: mpsc::Sender<Envelope>,
    snapshot_rx: watch::Receiver<VisualSnapshot>,
    task: JoinHandle<()>,
}

impl VisualHandle {
    pub fn spawn(
        timing: VisualTiming,
        playlist_rx: watch::Receiver<Vec<MediaItem>>,
        preloader: Arc<dyn Preloader>,
        events: EventBus,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(VisualSnapshot::loading());
        let driver = VisualDriver {
            scheduler: VisualScheduler::new(timing),
            armed: None,
            snapshot_tx,
            preloader,
            events,
        };
        let task = tokio::spawn(driver.run(rx, playlist_rx));
        Self {
            tx,
            snapshot_rx,
            task,
        }
    }

    /// Deliver a command; `true` when the scheduler acted on it
    pub async fn send(&self, command: VisualCommand) -> Result<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope { command, reply })
            .await
            .map_err(|_| Error::InvalidState("visual driver stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| Error::InvalidState("visual driver stopped".to_string()))
    }

    pub fn snapshot(&self) -> VisualSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VisualSnapshot> {
        self.snapshot_rx.clone()
    }
}

impl Drop for VisualHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct VisualDriver {
    scheduler: VisualScheduler,
    armed: Option<(TimerToken, Instant)>,
    snapshot_tx: watch::Sender<VisualSnapshot>,
    preloader: Arc<dyn Preloader>,
    events: EventBus,
}

impl VisualDriver {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<Envelope>,
        mut playlist_rx: watch::Receiver<Vec<MediaItem>>,
    ) {
        let initial = playlist_rx.borrow_and_update().clone();
        self.scheduler.set_playlist(initial);
        self.after_change();

        let mut playlist_open = true;
        loop {
            let mut reply_to = None;
            let deadline = self
                .armed
                .map(|(_, at)| at)
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                envelope = rx.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        debug!("Visual driver command channel closed");
                        return;
                    };
                    let acted = self.apply(command);
                    reply_to = Some((reply, acted));
                }
                changed = playlist_rx.changed(), if playlist_open => {
                    if changed.is_err() {
                        playlist_open = false;
                        continue;
                    }
                    let items = playlist_rx.borrow_and_update().clone();
                    self.scheduler.set_playlist(items);
                }
                _ = tokio::time::sleep_until(deadline), if self.armed.is_some() => {
                    if let Some((token, _)) = self.armed.take() {
                        self.scheduler.on_timer(token);
                    }
                }
            }

            self.after_change();
            if let Some((reply, acted)) = reply_to {
                let _ = reply.send(acted);
            }
        }
    }

    fn apply(&mut self, command: VisualCommand) -> bool {
        let acted = match &command {
            VisualCommand::MediaEnded { item_id } => self.scheduler.media_ended(item_id),
            VisualCommand::MediaError { item_id, error } => {
                warn!("Media error on {}: {}", item_id, error);
                self.scheduler.media_error(item_id, error.clone())
            }
            VisualCommand::Retry => self.scheduler.retry(),
            VisualCommand::ForceSkip => self.scheduler.force_skip(),
        };
        if !acted {
            debug!("Ignored {:?} in state {:?}", command, self.scheduler.snapshot().phase);
        }
        acted
    }

    /// Re-arm the deadline, start preloads and publish
    fn after_change(&mut self) {
        let wanted = self.scheduler.pending_timer();
        match (wanted, self.armed) {
            (Some(request), Some((token, _))) if request.token == token => {}
            (Some(request), _) => {
                self.armed = Some((request.token, Instant::now() + request.after));
            }
            (None, _) => self.armed = None,
        }

        if let Some(item) = self.scheduler.take_preload() {
            let preloader = Arc::clone(&self.preloader);
            tokio::spawn(async move {
                if let Err(e) = preloader.preload(&item.url).await {
                    warn!("Preload of {} failed: {}", item.url, e);
                }
            });
        }

        let snapshot = self.scheduler.snapshot();
        if *self.snapshot_tx.borrow() != snapshot {
            debug!(
                "Visual {} at index {}{}",
                snapshot.phase,
                snapshot.index,
                snapshot
                    .current
                    .as_ref()
                    .map(|item| format!(" ({})", item.id))
                    .unwrap_or_default()
            );
            self.snapshot_tx.send_replace(snapshot.clone());
            self.events.emit_lossy(SignageEvent::VisualStateChanged {
                snapshot,
                timestamp: Utc::now(),
            });
        }
    }
}

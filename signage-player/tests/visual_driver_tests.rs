//! Visual driver timing under a paused clock

mod helpers;

use helpers::{item, RecordingPreloader};
use signage_common::events::{EventBus, VisualPhase};
use signage_common::{MediaItem, MediaKind};
use signage_player::playback::{
    MediaError, NoopPreloader, Preloader, VisualCommand, VisualHandle, VisualTiming,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn instant_transitions() -> VisualTiming {
    VisualTiming {
        transition: Duration::ZERO,
        ..VisualTiming::default()
    }
}

fn spawn(timing: VisualTiming, playlist: Vec<MediaItem>) -> (VisualHandle, watch::Sender<Vec<MediaItem>>) {
    let (tx, rx) = watch::channel(playlist);
    let handle = VisualHandle::spawn(timing, rx, Arc::new(NoopPreloader), EventBus::new(64));
    (handle, tx)
}

fn current_id(handle: &VisualHandle) -> Option<String> {
    handle.snapshot().current.map(|m| m.id)
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_rotation_follows_durations_and_video_end() {
    let playlist = vec![
        item("a", MediaKind::Image, 2, 0),
        item("b", MediaKind::Video, 0, 1),
        item("c", MediaKind::Image, 3, 2),
    ];
    let (handle, _tx) = spawn(instant_transitions(), playlist);

    advance(1).await;
    assert_eq!(current_id(&handle).as_deref(), Some("a"));
    assert_eq!(handle.snapshot().phase, VisualPhase::Showing);

    advance(2_000).await;
    let snapshot = handle.snapshot();
    assert_eq!(current_id(&handle).as_deref(), Some("b"));
    assert!(snapshot.start_muted);

    // Videos have no display timer
    advance(60_000).await;
    assert_eq!(current_id(&handle).as_deref(), Some("b"));

    let acted = handle
        .send(VisualCommand::MediaEnded {
            item_id: "b".to_string(),
        })
        .await
        .unwrap();
    assert!(acted);
    assert_eq!(current_id(&handle).as_deref(), Some("c"));

    advance(3_010).await;
    assert_eq!(current_id(&handle).as_deref(), Some("a"));
    assert_eq!(handle.snapshot().index, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ended_for_other_item_is_ignored() {
    let playlist = vec![
        item("a", MediaKind::Video, 0, 0),
        item("b", MediaKind::Image, 5, 1),
    ];
    let (handle, _tx) = spawn(instant_transitions(), playlist);
    advance(1).await;

    let acted = handle
        .send(VisualCommand::MediaEnded {
            item_id: "b".to_string(),
        })
        .await
        .unwrap();
    assert!(!acted);
    assert_eq!(current_id(&handle).as_deref(), Some("a"));
}

#[tokio::test(start_paused = true)]
async fn test_errored_single_item_is_reshown_after_grace() {
    let (handle, _tx) = spawn(
        instant_transitions(),
        vec![item("a", MediaKind::Image, 30, 0)],
    );
    advance(1).await;
    let first_instance = handle.snapshot().instance;

    handle
        .send(VisualCommand::MediaError {
            item_id: "a".to_string(),
            error: MediaError::LoadFailed,
        })
        .await
        .unwrap();
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, VisualPhase::Errored);
    assert_eq!(snapshot.error.as_deref(), Some("LOAD_FAILED :: 404_OR_CORS"));

    advance(4_990).await;
    assert_eq!(handle.snapshot().phase, VisualPhase::Errored);

    advance(20).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, VisualPhase::Showing);
    assert_eq!(current_id(&handle).as_deref(), Some("a"));
    assert!(snapshot.instance > first_instance);
}

#[tokio::test(start_paused = true)]
async fn test_retry_cancels_grace_timer() {
    let (handle, _tx) = spawn(
        instant_transitions(),
        vec![
            item("a", MediaKind::Image, 30, 0),
            item("b", MediaKind::Image, 30, 1),
        ],
    );
    advance(1).await;

    handle
        .send(VisualCommand::MediaError {
            item_id: "a".to_string(),
            error: MediaError::Decode {
                code: 4,
                message: "unsupported".to_string(),
            },
        })
        .await
        .unwrap();
    assert_eq!(
        handle.snapshot().error.as_deref(),
        Some("CODE_4 :: unsupported")
    );

    assert!(handle.send(VisualCommand::Retry).await.unwrap());
    let retried = handle.snapshot().instance;

    advance(6_000).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, VisualPhase::Showing);
    assert_eq!(current_id(&handle).as_deref(), Some("a"));
    assert_eq!(snapshot.instance, retried);
}

#[tokio::test(start_paused = true)]
async fn test_cross_fade_holds_outgoing_item() {
    let (handle, _tx) = spawn(
        VisualTiming::default(),
        vec![
            item("a", MediaKind::Image, 1, 0),
            item("b", MediaKind::Image, 1, 1),
        ],
    );
    advance(1).await;

    advance(1_100).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, VisualPhase::Transitioning);
    assert!(snapshot.transition_pending);
    assert_eq!(current_id(&handle).as_deref(), Some("a"));

    advance(200).await;
    assert_eq!(handle.snapshot().phase, VisualPhase::Showing);
    assert_eq!(current_id(&handle).as_deref(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_force_skip_and_playlist_shrink() {
    let (handle, tx) = spawn(
        instant_transitions(),
        vec![
            item("a", MediaKind::Image, 30, 0),
            item("b", MediaKind::Image, 30, 1),
            item("c", MediaKind::Image, 30, 2),
        ],
    );
    advance(1).await;

    assert!(handle.send(VisualCommand::ForceSkip).await.unwrap());
    assert!(handle.send(VisualCommand::ForceSkip).await.unwrap());
    assert_eq!(current_id(&handle).as_deref(), Some("c"));

    tx.send_replace(vec![item("a", MediaKind::Image, 30, 0)]);
    advance(1).await;
    assert_eq!(current_id(&handle).as_deref(), Some("a"));
    assert_eq!(handle.snapshot().index, 0);

    tx.send_replace(Vec::new());
    advance(1).await;
    assert_eq!(handle.snapshot().phase, VisualPhase::Loading);
}

#[tokio::test(start_paused = true)]
async fn test_next_image_is_preloaded() {
    let preloader = Arc::new(RecordingPreloader::default());
    let (_tx, rx) = watch::channel(vec![
        item("a", MediaKind::Video, 0, 0),
        item("b.png", MediaKind::Image, 5, 1),
    ]);
    let _handle = VisualHandle::spawn(
        instant_transitions(),
        rx,
        Arc::clone(&preloader) as Arc<dyn Preloader>,
        EventBus::new(16),
    );

    advance(5).await;
    assert_eq!(preloader.urls(), vec!["https://cdn.example/b.png".to_string()]);
}

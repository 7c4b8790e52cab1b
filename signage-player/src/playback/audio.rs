//! Background audio playlist scheduler
//!
//! Independent cursor over the effective audio playlist, sequential or
//! shuffled. Owns the single audio output, created on the first user
//! gesture and released when the scheduler goes away.

use super::audio_output::{AnalysisTap, AudioOutput, AudioOutputFactory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use signage_common::events::AudioSnapshot;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shuffle step with the repeat adjustment
///
/// `drawn` is a uniform draw in `[0, len)`. Drawing the current index of a
/// multi-track playlist moves to the following track instead.
pub fn next_shuffle_index(current: usize, len: usize, drawn: usize) -> usize {
    if len > 1 && drawn == current {
        (drawn + 1) % len
    } else {
        drawn
    }
}

pub struct AudioScheduler {
    tracks: Vec<String>,
    index: usize,
    shuffle: bool,
    muted: bool,
    /// A user gesture (or unmute) has happened; output may exist
    unlocked: bool,
    factory: Arc<dyn AudioOutputFactory>,
    output: Option<Box<dyn AudioOutput>>,
    loaded: Option<String>,
    playing: bool,
    rng: StdRng,
}

impl AudioScheduler {
    pub fn new(factory: Arc<dyn AudioOutputFactory>) -> Self {
        Self::with_rng(factory, StdRng::from_entropy())
    }

    /// Deterministic shuffle draws
    pub fn with_seed(factory: Arc<dyn AudioOutputFactory>, seed: u64) -> Self {
        Self::with_rng(factory, StdRng::seed_from_u64(seed))
    }

    fn with_rng(factory: Arc<dyn AudioOutputFactory>, rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            index: 0,
            shuffle: false,
            muted: false,
            unlocked: false,
            factory,
            output: None,
            loaded: None,
            playing: false,
            rng,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current_track(&self) -> Option<&str> {
        self.tracks.get(self.index).map(String::as_str)
    }

    /// Adopt a new effective playlist
    ///
    /// The cursor survives unless it is now out of range.
    pub fn set_tracks(&mut self, tracks: Vec<String>) {
        if tracks == self.tracks {
            return;
        }
        if self.index >= tracks.len() {
            self.index = 0;
        }
        self.tracks = tracks;
        self.sync_output();
    }

    pub fn track_ended(&mut self) {
        self.advance();
        self.restart_output();
    }

    /// A track that cannot play is skipped like one that ended
    pub fn track_error(&mut self) {
        warn!("Audio track {:?} failed, skipping", self.current_track());
        self.advance();
        self.restart_output();
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        debug!("Audio shuffle {}", self.shuffle);
        self.shuffle
    }

    /// Unmuting counts as a user gesture
    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        if !self.muted {
            self.unlocked = true;
        }
        debug!("Audio muted {}", self.muted);
        self.sync_output();
        self.muted
    }

    /// First click/touch on the display unlocks playback
    pub fn interact(&mut self) {
        if !self.unlocked {
            info!("Audio playback unlocked by user gesture");
        }
        self.unlocked = true;
        self.sync_output();
    }

    pub fn analysis(&self) -> Option<AnalysisTap> {
        self.output.as_ref().map(|output| output.analysis())
    }

    /// Drop the output resource
    pub fn release(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.release();
            debug!("Audio output released");
        }
        self.loaded = None;
        self.playing = false;
    }

    pub fn snapshot(&self) -> AudioSnapshot {
        AudioSnapshot {
            tracks: self.tracks.clone(),
            index: self.index,
            current_track: self.current_track().map(str::to_string),
            shuffle: self.shuffle,
            muted: self.muted,
            output_active: self.output.is_some(),
        }
    }

    fn advance(&mut self) {
        let len = self.tracks.len();
        if len == 0 {
            return;
        }
        self.index = if self.shuffle {
            let drawn = self.rng.gen_range(0..len);
            next_shuffle_index(self.index, len, drawn)
        } else {
            (self.index + 1) % len
        };
    }

    /// Reload the cursor track even if its URL equals the finished one
    fn restart_output(&mut self) {
        self.loaded = None;
        self.playing = false;
        self.sync_output();
    }

    /// Bring the output in line with cursor, mute and unlock state
    fn sync_output(&mut self) {
        if !self.unlocked {
            return;
        }
        let current = self.tracks.get(self.index).cloned();
        let should_play = current.is_some() && !self.muted;

        if self.output.is_none() {
            if current.is_none() {
                return;
            }
            self.output = Some(self.factory.create());
        }
        let Some(output) = self.output.as_mut() else {
            return;
        };

        if current != self.loaded {
            if let Some(url) = &current {
                output.load(url);
            }
            self.loaded = current;
            self.playing = false;
        }

        if should_play && !self.playing {
            output.play();
            self.playing = true;
        } else if !should_play && self.playing {
            output.pause();
            self.playing = false;
        }
    }
}

impl Drop for AudioScheduler {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::audio_output::Spectrum;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    struct RecordingOutput {
        log: Arc<Log>,
        tap: AnalysisTap,
    }

    impl AudioOutput for RecordingOutput {
        fn load(&mut self, url: &str) {
            self.log.0.lock().unwrap().push(format!("load {}", url));
        }
        fn play(&mut self) {
            self.log.0.lock().unwrap().push("play".to_string());
        }
        fn pause(&mut self) {
            self.log.0.lock().unwrap().push("pause".to_string());
        }
        fn release(&mut self) {
            self.log.0.lock().unwrap().push("release".to_string());
        }
        fn analysis(&self) -> AnalysisTap {
            self.tap.clone()
        }
    }

    struct RecordingFactory(Arc<Log>);

    impl AudioOutputFactory for RecordingFactory {
        fn create(&self) -> Box<dyn AudioOutput> {
            Box::new(RecordingOutput {
                log: Arc::clone(&self.0),
                tap: AnalysisTap::new(),
            })
        }
    }

    fn scheduler(seed: u64) -> (AudioScheduler, Arc<Log>) {
        let log = Arc::new(Log::default());
        let factory = Arc::new(RecordingFactory(Arc::clone(&log)));
        (AudioScheduler::with_seed(factory, seed), log)
    }

    fn tracks(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("https://a.example/{}.mp3", i)).collect()
    }

    fn take_log(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.0.lock().unwrap())
    }

    #[test]
    fn test_shuffle_adjustment() {
        assert_eq!(next_shuffle_index(0, 2, 0), 1);
        assert_eq!(next_shuffle_index(0, 2, 1), 1);
        assert_eq!(next_shuffle_index(2, 3, 2), 0);
        assert_eq!(next_shuffle_index(0, 1, 0), 0);
    }

    #[test]
    fn test_two_track_shuffle_never_repeats() {
        for seed in 0..50 {
            let (mut s, _) = scheduler(seed);
            s.set_tracks(tracks(2));
            s.toggle_shuffle();
            for _ in 0..10 {
                let before = s.index();
                s.track_ended();
                assert_ne!(s.index(), before);
            }
        }
    }

    #[test]
    fn test_sequential_wraps_and_index_survives_changes() {
        let (mut s, _) = scheduler(1);
        s.set_tracks(tracks(3));
        s.track_ended();
        s.track_ended();
        assert_eq!(s.index(), 2);
        s.track_ended();
        assert_eq!(s.index(), 0);

        s.track_ended();
        s.set_tracks(tracks(2));
        assert_eq!(s.index(), 1);
        s.set_tracks(tracks(1));
        assert_eq!(s.index(), 0);
    }

    #[test]
    fn test_output_created_lazily_on_gesture() {
        let (mut s, log) = scheduler(1);
        s.set_tracks(tracks(2));
        assert!(s.analysis().is_none());
        assert!(take_log(&log).is_empty());

        s.interact();
        assert!(s.snapshot().output_active);
        assert_eq!(
            take_log(&log),
            vec!["load https://a.example/1.mp3".to_string(), "play".to_string()]
        );

        s.toggle_mute();
        assert_eq!(take_log(&log), vec!["pause".to_string()]);
        s.track_ended();
        assert_eq!(s.index(), 1);
        assert_eq!(take_log(&log), vec!["load https://a.example/2.mp3".to_string()]);

        s.toggle_mute();
        assert_eq!(take_log(&log), vec!["play".to_string()]);

        let tap = s.analysis().unwrap();
        tap.update(Spectrum::silent()).unwrap();

        drop(s);
        assert_eq!(take_log(&log), vec!["release".to_string()]);
    }

    #[test]
    fn test_unmute_unlocks() {
        let (mut s, log) = scheduler(1);
        s.set_tracks(tracks(1));
        assert!(s.toggle_mute());
        assert!(take_log(&log).is_empty());
        assert!(!s.toggle_mute());
        assert!(s.snapshot().output_active);
        assert_eq!(
            take_log(&log),
            vec!["load https://a.example/1.mp3".to_string(), "play".to_string()]
        );
    }

    #[test]
    fn test_single_track_restarts_after_ending() {
        let (mut s, log) = scheduler(1);
        s.set_tracks(tracks(1));
        s.interact();
        take_log(&log);

        s.track_ended();
        assert_eq!(s.index(), 0);
        assert!(s.snapshot().output_active);
        assert_eq!(
            take_log(&log),
            vec!["load https://a.example/1.mp3".to_string(), "play".to_string()]
        );

        s.track_error();
        assert_eq!(
            take_log(&log),
            vec!["load https://a.example/1.mp3".to_string(), "play".to_string()]
        );
    }

    #[test]
    fn test_duplicate_urls_replay_in_sequence() {
        let (mut s, log) = scheduler(1);
        let url = "https://a.example/same.mp3".to_string();
        s.set_tracks(vec![url.clone(), url.clone()]);
        s.interact();
        take_log(&log);

        s.track_ended();
        assert_eq!(s.index(), 1);
        assert_eq!(take_log(&log), vec![format!("load {}", url), "play".to_string()]);
    }
}

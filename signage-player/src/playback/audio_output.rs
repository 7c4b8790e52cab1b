//! Audio output resource and analysis tap
//!
//! The physical audio element lives in the rendering client. The default
//! output therefore forwards commands over the event bus and exposes an
//! analysis tap the client feeds back with spectrum frames.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use signage_common::events::{AudioCommand, EventBus, SignageEvent};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Analyser window size
pub const FFT_SIZE: usize = 2048;

/// Frequency bins produced per frame
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;

/// One analysis frame: byte magnitudes per frequency bin and the matching
/// time-domain waveform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spectrum {
    pub frequency: Vec<u8>,
    pub waveform: Vec<u8>,
}

impl Spectrum {
    /// Silent frame (waveform centred at 128)
    pub fn silent() -> Self {
        Self {
            frequency: vec![0; FREQUENCY_BIN_COUNT],
            waveform: vec![128; FFT_SIZE],
        }
    }
}

/// Shared, latest-frame-wins analysis tap
#[derive(Debug, Clone)]
pub struct AnalysisTap {
    frame: Arc<RwLock<Spectrum>>,
}

impl Default for AnalysisTap {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisTap {
    pub fn new() -> Self {
        Self {
            frame: Arc::new(RwLock::new(Spectrum::silent())),
        }
    }

    pub fn fft_size(&self) -> usize {
        FFT_SIZE
    }

    pub fn frequency_bin_count(&self) -> usize {
        FREQUENCY_BIN_COUNT
    }

    /// Latest frame
    pub fn read(&self) -> Spectrum {
        match self.frame.read() {
            Ok(frame) => frame.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the latest frame; sizes must match the analyser window
    pub fn update(&self, spectrum: Spectrum) -> Result<()> {
        if spectrum.frequency.len() != FREQUENCY_BIN_COUNT || spectrum.waveform.len() != FFT_SIZE {
            return Err(Error::InvalidInput(format!(
                "Expected {} frequency bins and {} waveform samples, got {} and {}",
                FREQUENCY_BIN_COUNT,
                FFT_SIZE,
                spectrum.frequency.len(),
                spectrum.waveform.len()
            )));
        }
        match self.frame.write() {
            Ok(mut frame) => *frame = spectrum,
            Err(poisoned) => *poisoned.into_inner() = spectrum,
        }
        Ok(())
    }
}

/// The single audio output owned by the audio scheduler
pub trait AudioOutput: Send {
    fn load(&mut self, url: &str);
    fn play(&mut self);
    fn pause(&mut self);
    /// Tear down the element and its analysis graph
    fn release(&mut self);
    fn analysis(&self) -> AnalysisTap;
}

/// Creates outputs lazily, on the first user gesture
pub trait AudioOutputFactory: Send + Sync {
    fn create(&self) -> Box<dyn AudioOutput>;
}

/// Output that forwards commands to the rendering client
pub struct EventAudioOutput {
    events: EventBus,
    tap: AnalysisTap,
    released: bool,
}

impl EventAudioOutput {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            tap: AnalysisTap::new(),
            released: false,
        }
    }

    fn command(&self, command: AudioCommand) {
        if self.released {
            return;
        }
        debug!("Audio output command: {:?}", command);
        self.events.emit_lossy(SignageEvent::AudioOutputCommand {
            command,
            timestamp: Utc::now(),
        });
    }
}

impl AudioOutput for EventAudioOutput {
    fn load(&mut self, url: &str) {
        self.command(AudioCommand::Load {
            url: url.to_string(),
        });
    }

    fn play(&mut self) {
        self.command(AudioCommand::Play);
    }

    fn pause(&mut self) {
        self.command(AudioCommand::Pause);
    }

    fn release(&mut self) {
        self.command(AudioCommand::Release);
        self.released = true;
    }

    fn analysis(&self) -> AnalysisTap {
        self.tap.clone()
    }
}

pub struct EventAudioOutputFactory {
    events: EventBus,
}

impl EventAudioOutputFactory {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }
}

impl AudioOutputFactory for EventAudioOutputFactory {
    fn create(&self) -> Box<dyn AudioOutput> {
        Box::new(EventAudioOutput::new(self.events.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_rejects_wrong_frame_size() {
        let tap = AnalysisTap::new();
        assert_eq!(tap.frequency_bin_count(), 1024);
        assert!(tap
            .update(Spectrum {
                frequency: vec![1; 16],
                waveform: vec![128; FFT_SIZE],
            })
            .is_err());

        let mut frame = Spectrum::silent();
        frame.frequency[3] = 200;
        tap.update(frame.clone()).unwrap();
        assert_eq!(tap.clone().read(), frame);
    }

    #[test]
    fn test_released_output_goes_quiet() {
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let mut output = EventAudioOutputFactory::new(events).create();

        output.load("https://a.example/1.mp3");
        output.release();
        output.play();

        let mut commands = Vec::new();
        while let Ok(SignageEvent::AudioOutputCommand { command, .. }) = rx.try_recv() {
            commands.push(command);
        }
        assert_eq!(
            commands,
            vec![
                AudioCommand::Load {
                    url: "https://a.example/1.mp3".to_string()
                },
                AudioCommand::Release
            ]
        );
    }
}

//! Playback scheduling
//!
//! Two independent schedulers, each a synchronous state machine owned by
//! one driver task:
//! - visual rotation through the media playlist
//! - background audio cycling through the settings' track list

pub mod audio;
pub mod audio_driver;
pub mod audio_output;
pub mod preload;
pub mod visual;
pub mod visual_driver;

pub use audio::AudioScheduler;
pub use audio_driver::{AudioControl, AudioHandle};
pub use audio_output::{
    AnalysisTap, AudioOutput, AudioOutputFactory, EventAudioOutputFactory, Spectrum,
};
pub use preload::{HttpPreloader, NoopPreloader, Preloader};
pub use visual::{MediaError, VisualScheduler, VisualState, VisualTiming};
pub use visual_driver::{VisualCommand, VisualHandle};

//! Playlist and settings repositories
//!
//! The only layer that knows which backend is active. Both repositories
//! publish their state over `watch` channels and the `EventBus`; remote
//! mutations are optimistic and reconciled by the next pushed snapshot.

pub mod playlist;
pub mod settings;

pub use playlist::{Direction, PlaylistRepository};
pub use settings::SettingsRepository;

//! # Signage Common Library
//!
//! Shared code for the signage workspace:
//! - Media and settings data model
//! - Event types (`SignageEvent`) and the `EventBus`
//! - Configuration loading and resolution
//! - Local database initialization and key-value access

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};
pub use model::{AppSettings, MediaItem, MediaKind, SettingsPatch};

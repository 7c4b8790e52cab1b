//! signage-player specific configuration

use signage_common::config::{PlaybackConfig, TomlConfig};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Player configuration after CLI overrides are applied
#[derive(Debug, Clone)]
pub struct Config {
    /// File settings (remote backend, app id, playback timing)
    pub file: TomlConfig,
    pub db_path: PathBuf,
    pub bind_addr: SocketAddr,
    /// Start in administrative view
    pub start_in_admin: bool,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub admin: bool,
}

impl Config {
    pub fn from_file(file: TomlConfig, overrides: Overrides) -> Self {
        let port = overrides.port.unwrap_or(file.server.port);
        let ip: IpAddr = file
            .server
            .bind
            .parse()
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        let db_path = overrides
            .db_path
            .unwrap_or_else(|| file.local.db_path.clone());
        Self {
            bind_addr: SocketAddr::new(ip, port),
            db_path,
            start_in_admin: overrides.admin,
            file,
        }
    }

    pub fn playback(&self) -> &PlaybackConfig {
        &self.file.playback
    }
}

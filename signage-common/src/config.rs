//! Configuration loading and resolution
//!
//! Config file lookup order:
//! 1. Command-line argument (highest priority)
//! 2. `SIGNAGE_CONFIG` environment variable
//! 3. Per-user config directory (`<config dir>/signage/config.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing file is not an error: the service starts on defaults and logs a
//! warning. A file that exists but does not parse is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SIGNAGE_CONFIG";

/// API key shipped in demo deployments; never treated as a real remote config
pub const PLACEHOLDER_API_KEY: &str = "dev-placeholder-key";

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Namespace for store collections and local keys
    pub app_id: String,
    /// Default tracing filter level
    pub log_level: String,
    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub playback: PlaybackConfig,
    pub server: ServerConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            app_id: "signage-demo".to_string(),
            log_level: "info".to_string(),
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            playback: PlaybackConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Remote realtime backend connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
    /// Pre-issued caller token; sent instead of the API key when present
    pub auth_token: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl RemoteConfig {
    /// Capability probe: the remote backend is only used when this holds
    pub fn is_valid(&self) -> bool {
        let url_ok = ["http://", "https://"].iter().any(|scheme| {
            self.base_url
                .strip_prefix(scheme)
                .map(|rest| !rest.is_empty() && !rest.starts_with('/'))
                .unwrap_or(false)
        });
        url_ok && !self.api_key.is_empty() && self.api_key != PLACEHOLDER_API_KEY
    }

    /// Request timeout, 10 s unless configured
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms.unwrap_or(10_000))
    }
}

/// Local durable backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub db_path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            db_path: CompiledDefaults::for_current_platform().db_path,
        }
    }
}

/// Scheduler timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub default_image_duration_s: u32,
    pub error_grace_ms: u64,
    pub transition_ms: u64,
    pub preload: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_image_duration_s: crate::model::DEFAULT_IMAGE_DURATION_S,
            error_grace_ms: 5_000,
            transition_ms: 200,
            preload: true,
        }
    }
}

/// HTTP control API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5780,
        }
    }
}

/// OS-dependent defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("signage"))
            .unwrap_or_else(|| PathBuf::from("./signage_data"));
        let config_file = dirs::config_dir().map(|d| d.join("signage").join("config.toml"));
        Self {
            db_path: data_dir.join("signage.db"),
            data_dir,
            config_file,
        }
    }
}

/// Resolve which config file to read, if any
///
/// Returns `None` when neither the CLI nor the environment names a file and
/// no per-user file exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    CompiledDefaults::for_current_platform()
        .config_file
        .filter(|p| p.exists())
}

/// Parse a TOML document into a config
pub fn parse_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
}

/// Load configuration with graceful degradation
///
/// A missing file yields defaults with a warning; an unreadable or malformed
/// file is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file {} not found, using compiled defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

//! Configuration for the dmxmon monitor.
//!
//! Built-in defaults, then an optional TOML file, then `DMXMON_*`
//! environment variables, merged with figment and translated into
//! `dmxmon_core::MonitorSettings`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dmxmon_core::MonitorSettings;
use dmxmon_core::config::{BAUD_RATE, READ_MODE_CHANGES};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Delay between device scans, in milliseconds.
    pub discovery_period_ms: u64,
    /// Delay between view refreshes, in milliseconds.
    pub refresh_period_ms: u64,
    /// How long one refresh waits for pending changes, in milliseconds.
    pub wait_window_ms: u64,
    /// Debounce interval for change notifications, in milliseconds.
    pub change_interval_ms: u64,
    pub baud_rate: u32,
    /// Read-mode value handed to the controller as is.
    pub read_mode: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_period_ms: 1000,
            refresh_period_ms: 40,
            wait_window_ms: 20,
            change_interval_ms: 40,
            baud_rate: BAUD_RATE,
            read_mode: READ_MODE_CHANGES,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("discovery_period_ms", self.discovery_period_ms),
            ("refresh_period_ms", self.refresh_period_ms),
            ("wait_window_ms", self.wait_window_ms),
            ("change_interval_ms", self.change_interval_ms),
        ];
        for (field, value) in periods {
            if value == 0 {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Validation {
                field: "baud_rate".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Translate into runtime settings for the core.
    pub fn to_settings(&self) -> MonitorSettings {
        MonitorSettings {
            discovery_period: Duration::from_millis(self.discovery_period_ms),
            refresh_period: Duration::from_millis(self.refresh_period_ms),
            wait_window: Duration::from_millis(self.wait_window_ms),
            change_interval: Duration::from_millis(self.change_interval_ms),
            baud_rate: self.baud_rate,
            read_mode: self.read_mode,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "dmxmon", "dmxmon").map_or_else(
        || PathBuf::from(".dmxmon.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading ─────────────────────────────────────────────────────────

fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DMXMON_"))
}

/// Load from `path` (or the platform default) plus environment.
///
/// A missing file is not an error; defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let default_path = config_path();
    let path = path.unwrap_or(&default_path);

    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

/// Serialize config to TOML at `path`, creating parent directories.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

//! Configuration management for the chat listener.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub classification: ClassificationConfig,

    #[serde(default)]
    pub listen: ListenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the listener is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay after bringing a window to the front, before snapshotting
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Sleep between full passes over all monitored windows
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_ms: u64,

    /// Poll interval of condition waits
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// How long to wait for the save-as dialog to appear
    #[serde(default = "default_save_dialog_timeout")]
    pub save_dialog_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            cycle_interval_ms: default_cycle_interval(),
            retry_interval_ms: default_retry_interval(),
            save_dialog_timeout_ms: default_save_dialog_timeout(),
        }
    }
}

impl TimingConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn save_dialog_timeout(&self) -> Duration {
        Duration::from_millis(self.save_dialog_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory that saved images, videos and files land in
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Horizontal distance in pixels between the window's left edge and the
    /// avatar of a message sent by someone else
    #[serde(default = "default_friend_avatar_offset")]
    pub friend_avatar_offset: i32,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            friend_avatar_offset: default_friend_avatar_offset(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Window titles to listen to on startup
    #[serde(default)]
    pub windows: Vec<String>,

    /// Drop a window that disappeared instead of halting the worker
    #[serde(default)]
    pub drop_unavailable_windows: bool,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_settle_delay() -> u64 {
    200
}

fn default_cycle_interval() -> u64 {
    500
}

fn default_retry_interval() -> u64 {
    200
}

fn default_save_dialog_timeout() -> u64 {
    1000
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_friend_avatar_offset() -> i32 {
    30
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chat-listener")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

//! Application settings and configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Namespace of the custom receiver channel.
pub const DEFAULT_CAST_NAMESPACE: &str = "urn:x-cast:com.localmovie.cast";

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    /// Media server URL
    pub server_url: String,
    /// Path prefix of the media API on the server
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
    /// Bearer token sent with API requests
    #[serde(default)]
    pub access_token: Option<String>,
    /// Client identifier sent with listing requests
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Custom message namespace understood by the receiver
    #[serde(default = "default_cast_namespace")]
    pub cast_namespace: String,
    /// Minimum spacing between checkpoints forwarded from progress events
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
    /// Periodic checkpoint interval while casting
    #[serde(default = "default_remote_checkpoint_interval")]
    pub remote_checkpoint_interval_secs: u64,
    /// Number of one second ticks before the next episode starts
    #[serde(default = "default_countdown")]
    pub autoplay_countdown_secs: u32,
    /// Gap between deactivating and reactivating a refreshed text track
    #[serde(default = "default_subtitle_refresh_delay")]
    pub subtitle_refresh_delay_ms: u64,
    /// Resume locally from the last remote position when a cast session ends
    #[serde(default = "default_true")]
    pub carry_remote_position_on_disconnect: bool,
    /// Local key-value store (watch progress, preferences)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_api_base_path() -> String {
    "/localmovie/v1".to_string()
}

fn default_client_id() -> String {
    "WEBAPP".to_string()
}

fn default_cast_namespace() -> String {
    DEFAULT_CAST_NAMESPACE.to_string()
}

fn default_checkpoint_interval() -> u64 {
    5
}

fn default_remote_checkpoint_interval() -> u64 {
    10
}

fn default_countdown() -> u32 {
    10
}

fn default_subtitle_refresh_delay() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Error types for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: "http://localhost:8080".to_string(),
            api_base_path: default_api_base_path(),
            access_token: None,
            client_id: default_client_id(),
            cast_namespace: default_cast_namespace(),
            checkpoint_interval_secs: default_checkpoint_interval(),
            remote_checkpoint_interval_secs: default_remote_checkpoint_interval(),
            autoplay_countdown_secs: default_countdown(),
            subtitle_refresh_delay_ms: default_subtitle_refresh_delay(),
            carry_remote_position_on_disconnect: true,
            store_path: None,
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Default location of the local store when `store_path` is unset
    pub fn default_store_path() -> PathBuf {
        Self::config_dir().join("store.json")
    }

    fn config_dir() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("r-moviecast")
    }

    /// Full API base, e.g. `http://host:8080/localmovie/v1`
    pub fn api_base_url(&self) -> String {
        let server = self.server_url.trim_end_matches('/');
        let path = self.api_base_path.trim_end_matches('/');
        if path.is_empty() {
            server.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", server, path)
        } else {
            format!("{}/{}", server, path)
        }
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn remote_checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.remote_checkpoint_interval_secs)
    }

    pub fn subtitle_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.subtitle_refresh_delay_ms)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.is_empty() {
            return Err(ConfigError::Validation("Server URL cannot be empty".to_string()));
        }

        if url::Url::parse(&self.server_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "Server URL is not a valid URL: {}",
                self.server_url
            )));
        }

        // Progress callbacks must be throttled to at most one call every 1..=10 seconds.
        if !(1..=10).contains(&self.checkpoint_interval_secs) {
            return Err(ConfigError::Validation(format!(
                "checkpoint_interval_secs must be between 1 and 10, got {}",
                self.checkpoint_interval_secs
            )));
        }

        if self.remote_checkpoint_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "remote_checkpoint_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.autoplay_countdown_secs == 0 {
            return Err(ConfigError::Validation(
                "autoplay_countdown_secs must be greater than zero".to_string(),
            ));
        }

        if !self.cast_namespace.starts_with("urn:x-cast:") {
            return Err(ConfigError::Validation(format!(
                "cast_namespace must start with 'urn:x-cast:', got {}",
                self.cast_namespace
            )));
        }

        Ok(())
    }
}

//! Small JSON key-value store for data that must survive restarts without the server:
//! the last known position of each item and the auto-play preference.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

const STORE_LOG_TARGET: &str = "r_moviecast::progress::store";

pub const WATCH_PROGRESS_KEY: &str = "media_watch_progress";
pub const AUTOPLAY_NEXT_KEY: &str = "media_autoplay_next";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Locally cached checkpoint for one media item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WatchProgress {
    pub position: u64,
    #[serde(default)]
    pub duration: Option<u64>,
    /// Unix seconds of the write.
    #[serde(default)]
    pub updated: u64,
}

impl WatchProgress {
    pub fn new(position: u64, duration: Option<u64>) -> Self {
        let updated = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        WatchProgress {
            position,
            duration,
            updated,
        }
    }
}

pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, serde_json::Value>>,
    /// Serializes file writes so a later snapshot never lands before an earlier one.
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Opens (or lazily creates) a store backed by `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let entries = if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            HashMap::new()
        };
        debug!(target: STORE_LOG_TARGET, "Opened local store at {:?} with {} keys", path, entries.len());
        Ok(LocalStore {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        LocalStore {
            path: None,
            entries: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let value = entries.get(key)?.clone();
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(target: STORE_LOG_TARGET, "Ignoring unreadable value for key {}: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        self.flush()
    }

    /// Writes the current entries to disk. Blocking; async callers go through
    /// `spawn_blocking`.
    pub fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let content = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*entries)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn watch_progress(&self, media_id: &str) -> Option<WatchProgress> {
        self.get::<HashMap<String, WatchProgress>>(WATCH_PROGRESS_KEY)?
            .remove(media_id)
    }

    pub fn set_watch_progress(&self, media_id: &str, progress: WatchProgress) -> Result<(), StoreError> {
        self.record_watch_progress(media_id, progress)?;
        self.flush()
    }

    /// Updates the in-memory progress only; `flush` writes it out.
    pub fn record_watch_progress(&self, media_id: &str, progress: WatchProgress) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: HashMap<String, WatchProgress> = entries
            .get(WATCH_PROGRESS_KEY)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        all.insert(media_id.to_string(), progress);
        entries.insert(WATCH_PROGRESS_KEY.to_string(), serde_json::to_value(&all)?);
        Ok(())
    }

    /// Auto-play-next preference; enabled unless explicitly turned off.
    pub fn autoplay_next(&self) -> bool {
        self.get(AUTOPLAY_NEXT_KEY).unwrap_or(true)
    }

    pub fn set_autoplay_next(&self, enabled: bool) -> Result<(), StoreError> {
        self.set(AUTOPLAY_NEXT_KEY, &enabled)
    }
}

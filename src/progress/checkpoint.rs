use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, instrument, trace, warn};

use crate::backend::{MediaApiContract, MediaApiError};
use crate::progress::store::{LocalStore, WatchProgress};

const CHECKPOINT_LOG_TARGET: &str = "r_moviecast::progress::checkpoint";

/// One position write. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRequest {
    pub media_id: String,
    pub position_seconds: u64,
    pub duration_seconds: Option<u64>,
    /// Base position URL; may carry a signed query string.
    pub endpoint: String,
}

impl CheckpointRequest {
    /// `{endpoint}/{position}?{existing query}&duration={duration}`
    pub fn url(&self) -> String {
        let (base, query) = match self.endpoint.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (self.endpoint.as_str(), None),
        };

        let mut url = format!("{}/{}", base.trim_end_matches('/'), self.position_seconds);
        let mut params: Vec<String> = Vec::new();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            params.push(query.to_string());
        }
        if let Some(duration) = self.duration_seconds {
            params.push(format!("duration={}", duration));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }
}

/// Whole seconds from a player-reported duration, if it is usable.
pub fn duration_to_seconds(duration: Option<f64>) -> Option<u64> {
    duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| d.round() as u64)
}

/// Persists playback positions without ever blocking or failing the caller.
pub struct CheckpointClient {
    api: Arc<dyn MediaApiContract>,
    store: Arc<LocalStore>,
    endpoints: Mutex<HashMap<String, String>>,
}

impl CheckpointClient {
    pub fn new(api: Arc<dyn MediaApiContract>, store: Arc<LocalStore>) -> Self {
        Self {
            api,
            store,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Remembers the signed position endpoint issued for `media_id`.
    pub fn register_endpoint(&self, media_id: &str, endpoint: &str) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints.insert(media_id.to_string(), endpoint.to_string());
    }

    pub fn forget_endpoint(&self, media_id: &str) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints.remove(media_id);
    }

    /// The registered endpoint, or the unsigned fallback.
    pub fn endpoint_for(&self, media_id: &str) -> String {
        let endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        endpoints
            .get(media_id)
            .cloned()
            .unwrap_or_else(|| self.api.position_endpoint(media_id))
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Builds the request for a checkpoint, or `None` when it must be skipped.
    pub fn request_for(
        &self,
        media_id: &str,
        position_seconds: f64,
        duration_seconds: Option<f64>,
    ) -> Option<CheckpointRequest> {
        if !position_seconds.is_finite() {
            return None;
        }
        // A zero reading carries no resume value and would clobber real progress.
        let position = position_seconds.floor();
        if position <= 0.0 {
            return None;
        }
        Some(CheckpointRequest {
            media_id: media_id.to_string(),
            position_seconds: position as u64,
            duration_seconds: duration_to_seconds(duration_seconds),
            endpoint: self.endpoint_for(media_id),
        })
    }

    /// Records the local fallback and fires the file and server writes in the background.
    ///
    /// Returns the handle of the spawned write so callers that care (the CLI, tests)
    /// can wait for it; playback code drops it.
    #[instrument(skip(self), fields(media_id = %media_id))]
    pub fn checkpoint(
        &self,
        media_id: &str,
        position_seconds: f64,
        duration_seconds: Option<f64>,
    ) -> Option<JoinHandle<()>> {
        let request = match self.request_for(media_id, position_seconds, duration_seconds) {
            Some(request) => request,
            None => {
                trace!(target: CHECKPOINT_LOG_TARGET, "Skipping checkpoint at position {}", position_seconds);
                return None;
            }
        };

        let local = WatchProgress::new(request.position_seconds, request.duration_seconds);
        if let Err(e) = self.store.record_watch_progress(&request.media_id, local) {
            warn!(target: CHECKPOINT_LOG_TARGET, "Failed to record local checkpoint for {}: {}", request.media_id, e);
        }

        let api = self.api.clone();
        let store = self.store.clone();
        Some(tokio::spawn(async move {
            tokio::join!(flush_store(store), send_checkpoint(api, request));
        }))
    }
}

async fn flush_store(store: Arc<LocalStore>) {
    if !store.is_persistent() {
        return;
    }
    match tokio::task::spawn_blocking(move || store.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(target: CHECKPOINT_LOG_TARGET, "Failed to write local checkpoint file: {}", e),
        Err(e) => error!(target: CHECKPOINT_LOG_TARGET, "Local checkpoint write task failed: {}", e),
    }
}

async fn send_checkpoint(api: Arc<dyn MediaApiContract>, request: CheckpointRequest) {
    let url = request.url();
    match api.update_position(&url).await {
        Ok(()) => trace!(target: CHECKPOINT_LOG_TARGET, "Checkpoint saved: {} at {}s", request.media_id, request.position_seconds),
        Err(MediaApiError::Network(e)) if e.is_timeout() => {
            warn!(target: CHECKPOINT_LOG_TARGET, "Timeout saving checkpoint for {}: {}", request.media_id, e);
        }
        Err(MediaApiError::Network(e)) => {
            warn!(target: CHECKPOINT_LOG_TARGET, "Network error saving checkpoint for {}: {}", request.media_id, e);
        }
        Err(e) => {
            error!(target: CHECKPOINT_LOG_TARGET, "Failed to save checkpoint for {}: {}", request.media_id, e);
        }
    }
}

//! Applies a subtitle delay to a player that has no native one, by swapping each
//! text track's content for a shifted copy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::{MediaApiContract, MediaApiError};
use crate::subtitle::vtt::{shift_vtt, TimestampError};

const OFFSET_LOG_TARGET: &str = "r_moviecast::subtitle::offset";

pub const VTT_MIME_TYPE: &str = "text/vtt";

#[derive(Debug, Error)]
pub enum SubtitleError {
    #[error("Failed to fetch subtitle track {track_id}: {source}")]
    Fetch {
        track_id: u32,
        #[source]
        source: MediaApiError,
    },
    #[error("Text track {0} has no content")]
    MissingContent(u32),
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTrack {
    pub track_id: u32,
    pub content_id: String,
}

/// The player side of subtitle handling.
pub trait TrackHost: Send + Sync {
    fn text_tracks(&self) -> Vec<TextTrack>;
    fn active_track_ids(&self) -> Vec<u32>;
    /// Opaque style of the text tracks, passed back untouched on edits.
    fn text_track_style(&self) -> Option<serde_json::Value>;
    fn set_track_content(&self, track_id: u32, content_id: &str);
    fn edit_active_tracks(&self, active_track_ids: &[u32], style: Option<&serde_json::Value>);
    /// Makes generated content loadable and returns its URI.
    fn register_content(&self, content: String, mime_type: &str) -> String;
    fn release_content(&self, uri: &str);
}

/// Outcome of one `apply_offset` call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OffsetReport {
    pub shifted: Vec<u32>,
    pub refreshed: Vec<u32>,
    pub failed: Vec<u32>,
}

/// Per-media subtitle offset state: original track text keyed by source URI and
/// the generated URIs currently handed to the host.
pub struct SubtitleOffsetApplier {
    api: Arc<dyn MediaApiContract>,
    host: Arc<dyn TrackHost>,
    refresh_delay: Duration,
    originals: HashMap<String, String>,
    sources: HashMap<u32, String>,
    generated: Vec<String>,
    /// Active track ids saved before a refresh switched them off, until it
    /// switches them back on.
    deactivated: Option<Vec<u32>>,
    offset_seconds: f64,
}

impl SubtitleOffsetApplier {
    pub fn new(api: Arc<dyn MediaApiContract>, host: Arc<dyn TrackHost>, refresh_delay: Duration) -> Self {
        Self {
            api,
            host,
            refresh_delay,
            originals: HashMap::new(),
            sources: HashMap::new(),
            generated: Vec::new(),
            deactivated: None,
            offset_seconds: 0.0,
        }
    }

    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    pub fn cached_sources(&self) -> usize {
        self.originals.len()
    }

    /// Shift every text track by `offset_seconds` relative to its original timing.
    ///
    /// Tracks whose source cannot be fetched are skipped and reported in
    /// `OffsetReport::failed`; the others are still updated.
    #[instrument(skip(self))]
    pub async fn apply_offset(&mut self, offset_seconds: f64) -> Result<OffsetReport, TimestampError> {
        if !offset_seconds.is_finite() {
            return Err(TimestampError::InvalidOffset(offset_seconds));
        }

        self.restore_interrupted_refresh();

        let tracks = self.host.text_tracks();
        let mut report = OffsetReport::default();
        if tracks.is_empty() {
            debug!(target: OFFSET_LOG_TARGET, "No text tracks to shift");
            self.offset_seconds = offset_seconds;
            return Ok(report);
        }

        info!(target: OFFSET_LOG_TARGET, "Applying subtitle offset {}s to {} track(s)", offset_seconds, tracks.len());
        // URIs handed out before this pass; released once every track points elsewhere.
        let stale = self.generated.len();

        for track in tracks {
            match self.shift_track(&track, offset_seconds).await {
                Ok(refreshed) => {
                    report.shifted.push(track.track_id);
                    if refreshed {
                        report.refreshed.push(track.track_id);
                    }
                }
                Err(SubtitleError::Timestamp(e)) => return Err(e),
                Err(e) => {
                    warn!(target: OFFSET_LOG_TARGET, "Skipping subtitle offset for track {}: {}", track.track_id, e);
                    report.failed.push(track.track_id);
                }
            }
        }

        let released: Vec<String> = self.generated.drain(..stale).collect();
        for uri in released {
            self.host.release_content(&uri);
        }
        self.offset_seconds = offset_seconds;
        Ok(report)
    }

    async fn shift_track(&mut self, track: &TextTrack, offset_seconds: f64) -> Result<bool, SubtitleError> {
        // The host's content id is our generated URI after the first pass; always
        // shift from the track's original source.
        let source = match self.sources.get(&track.track_id) {
            Some(source) => source.clone(),
            None => {
                if track.content_id.is_empty() {
                    return Err(SubtitleError::MissingContent(track.track_id));
                }
                self.sources.insert(track.track_id, track.content_id.clone());
                track.content_id.clone()
            }
        };

        let original = self.original_text(track.track_id, &source).await?;
        let shifted = shift_vtt(&original, offset_seconds)?;

        let uri = self.host.register_content(shifted, VTT_MIME_TYPE);
        self.generated.push(uri.clone());
        self.host.set_track_content(track.track_id, &uri);

        let active = self.host.active_track_ids();
        if !active.contains(&track.track_id) {
            return Ok(false);
        }

        debug!(target: OFFSET_LOG_TARGET, "Refreshing active text track {}", track.track_id);
        let style = self.host.text_track_style();
        self.deactivated = Some(active.clone());
        self.host.edit_active_tracks(&[], style.as_ref());
        tokio::time::sleep(self.refresh_delay).await;
        self.host.edit_active_tracks(&active, style.as_ref());
        self.deactivated = None;
        Ok(true)
    }

    /// A pass dropped between deactivate and reactivate leaves the tracks off;
    /// switch the saved ones back on before touching anything else.
    fn restore_interrupted_refresh(&mut self) {
        if let Some(active) = self.deactivated.take() {
            warn!(target: OFFSET_LOG_TARGET, "Restoring text tracks {:?} left off by an interrupted refresh", active);
            let style = self.host.text_track_style();
            self.host.edit_active_tracks(&active, style.as_ref());
        }
    }

    async fn original_text(&mut self, track_id: u32, source: &str) -> Result<String, SubtitleError> {
        if let Some(text) = self.originals.get(source) {
            return Ok(text.clone());
        }
        let text = self
            .api
            .fetch_subtitle(source)
            .await
            .map_err(|source| SubtitleError::Fetch { track_id, source })?;
        self.originals.insert(source.to_string(), text.clone());
        Ok(text)
    }

    /// Drops cached originals and releases every generated URI. Call on media change.
    pub fn clear(&mut self) {
        debug!(target: OFFSET_LOG_TARGET, "Clearing subtitle cache ({} sources, {} generated)", self.originals.len(), self.generated.len());
        self.restore_interrupted_refresh();
        self.originals.clear();
        self.sources.clear();
        for uri in self.generated.drain(..) {
            self.host.release_content(&uri);
        }
        self.offset_seconds = 0.0;
    }
}

impl Drop for SubtitleOffsetApplier {
    fn drop(&mut self) {
        self.restore_interrupted_refresh();
        for uri in self.generated.drain(..) {
            self.host.release_content(&uri);
        }
    }
}

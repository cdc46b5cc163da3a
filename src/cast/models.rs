//! Load-request wire types and remote connection state.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Cast metadata type for movies.
pub const MOVIE_METADATA_TYPE: u8 = 1;
pub const SUBTITLE_TRACK_ID: u32 = 1;
pub const SUBTITLE_LANGUAGE: &str = "en-US";
pub const SUBTITLE_NAME: &str = "English";
pub const SUBTITLE_CONTENT_TYPE: &str = "text/vtt";
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";
pub const SET_SUBTITLE_OFFSET: &str = "SET_SUBTITLE_OFFSET";

static START_FRAGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#t=(\d+(?:\.\d+)?)").expect("fragment pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Observable view of the remote link.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConnection {
    pub state: ConnectionState,
    pub session_id: Option<String>,
    pub device_name: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub paused: bool,
    pub last_error: Option<String>,
}

impl Default for RemoteConnection {
    fn default() -> Self {
        RemoteConnection {
            state: ConnectionState::Disconnected,
            session_id: None,
            device_name: None,
            position: 0.0,
            duration: 0.0,
            paused: true,
            last_error: None,
        }
    }
}

impl RemoteConnection {
    pub fn is_casting(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Error text for display, naming the device when it is known.
    pub fn error_message(&self) -> Option<String> {
        let error = self.last_error.as_ref()?;
        Some(match &self.device_name {
            Some(device) => format!("{} ({})", error, device),
            None => error.clone(),
        })
    }
}

/// What the orchestrator asks the remote surface to play.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadMediaOptions {
    /// Stream URL, optionally with a `#t=<seconds>` start fragment.
    pub url: String,
    pub title: String,
    pub poster_url: Option<String>,
    pub content_type: Option<String>,
    pub subtitle_url: Option<String>,
    pub update_position_url: Option<String>,
    pub media_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub media: MediaInformation,
    pub autoplay: bool,
    pub current_time: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub active_track_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    pub content_id: String,
    pub content_type: String,
    pub stream_type: String,
    pub metadata: MediaMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<MediaTrack>,
}

/// Movie metadata plus the fields the receiver reads to checkpoint on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaMetadata {
    #[serde(rename = "metadataType")]
    pub metadata_type: u8,
    pub title: String,
    pub images: Vec<Image>,
    #[serde(rename = "media-id")]
    pub media_id: String,
    #[serde(rename = "update-position-url", skip_serializing_if = "Option::is_none")]
    pub update_position_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTrack {
    pub track_id: u32,
    #[serde(rename = "type")]
    pub track_type: String,
    pub subtype: String,
    pub track_content_id: String,
    pub track_content_type: String,
    pub language: String,
    pub name: String,
}

/// Start offset encoded in a `#t=` fragment, 0 when absent.
pub fn start_offset_from_url(url: &str) -> f64 {
    START_FRAGMENT_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// The URL without any fragment.
pub fn strip_fragment(url: &str) -> &str {
    match url.split_once('#') {
        Some((bare, _)) => bare,
        None => url,
    }
}

/// `url#t=<seconds>` for handing a start point to a surface.
pub fn with_start_fragment(url: &str, start_seconds: f64) -> String {
    let bare = strip_fragment(url);
    let start = if start_seconds.is_finite() && start_seconds > 0.0 {
        start_seconds.floor() as u64
    } else {
        0
    };
    if start == 0 {
        bare.to_string()
    } else {
        format!("{}#t={}", bare, start)
    }
}

impl LoadMediaOptions {
    pub fn to_load_request(&self) -> LoadRequest {
        let tracks: Vec<MediaTrack> = self
            .subtitle_url
            .iter()
            .map(|subtitle| MediaTrack {
                track_id: SUBTITLE_TRACK_ID,
                track_type: "TEXT".to_string(),
                subtype: "SUBTITLES".to_string(),
                track_content_id: subtitle.clone(),
                track_content_type: SUBTITLE_CONTENT_TYPE.to_string(),
                language: SUBTITLE_LANGUAGE.to_string(),
                name: SUBTITLE_NAME.to_string(),
            })
            .collect();
        let active_track_ids = tracks.iter().map(|t| t.track_id).collect();

        LoadRequest {
            media: MediaInformation {
                content_id: strip_fragment(&self.url).to_string(),
                content_type: self
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
                stream_type: "BUFFERED".to_string(),
                metadata: MediaMetadata {
                    metadata_type: MOVIE_METADATA_TYPE,
                    title: self.title.clone(),
                    images: self
                        .poster_url
                        .iter()
                        .map(|url| Image { url: url.clone() })
                        .collect(),
                    media_id: self.media_id.clone(),
                    update_position_url: self.update_position_url.clone(),
                },
                tracks,
            },
            autoplay: true,
            current_time: start_offset_from_url(&self.url),
            active_track_ids,
        }
    }
}

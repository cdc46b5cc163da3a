use serde::{Deserialize, Serialize};

/// Media type tag the server attaches to series episodes.
pub const EPISODE_MEDIA_TYPE: &str = "EPISODE";

/// A media file as returned by `GET /media/{id}` and the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub media_file_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub parent_path: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub media_views: Vec<MediaView>,
    #[serde(default)]
    pub signed_urls: Option<SignedUrls>,
    #[serde(default)]
    pub streamable: bool,
    #[serde(default)]
    pub media: Option<MediaDetails>,
}

/// A prior view of the file by the current user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaView {
    #[serde(default)]
    pub position: f64,
    /// Seconds, when the server knows it.
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MediaDetails {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub number: Option<i32>,
}

/// Signed URIs issued by `GET /media/{id}/url/signed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrls {
    pub stream: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub update_position: String,
    #[serde(default)]
    pub stream_content_type: Option<String>,
}

/// Largest page size and page index the server accepts.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE: u32 = 100;

/// Body of the `POST /media` listing request. Pages are zero-based.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequest {
    pub path: String,
    pub page: u32,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    pub client: String,
}

impl MediaRequest {
    /// Listing of everything directly under `parent_path`, in server order.
    pub fn children_of(parent_path: &str, client: &str) -> Self {
        MediaRequest {
            path: parent_path.to_string(),
            page: 0,
            page_size: MAX_PAGE_SIZE,
            order: None,
            client: client.to_string(),
        }
    }

    /// The same listing one page further, or `None` past the last page the server serves.
    pub fn next_page(&self) -> Option<Self> {
        if self.page >= MAX_PAGE {
            return None;
        }
        Some(MediaRequest {
            page: self.page + 1,
            ..self.clone()
        })
    }
}

impl MediaFile {
    /// Display title, falling back to the file name and then the path.
    pub fn title(&self) -> String {
        self.media
            .as_ref()
            .and_then(|m| m.title.clone())
            .or_else(|| self.file_name.clone())
            .unwrap_or_else(|| self.path.clone())
    }

    pub fn is_episode(&self) -> bool {
        self.media
            .as_ref()
            .and_then(|m| m.media_type.as_deref())
            .map(|t| t.eq_ignore_ascii_case(EPISODE_MEDIA_TYPE))
            .unwrap_or(false)
    }

    /// Last known position in whole seconds, 0 when there is no usable view.
    pub fn resume_position(&self) -> u64 {
        self.media_views
            .first()
            .map(|v| v.position)
            .filter(|p| p.is_finite() && *p > 0.0)
            .map(|p| p.floor() as u64)
            .unwrap_or(0)
    }

    pub fn known_duration(&self) -> Option<f64> {
        self.media_views
            .first()
            .and_then(|v| v.duration)
            .filter(|d| d.is_finite() && *d > 0.0)
    }
}

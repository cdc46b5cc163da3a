//! Media server API client implementation

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

use crate::backend::models::{MediaFile, MediaRequest, SignedUrls};

const API_LOG_TARGET: &str = "r_moviecast::backend::api";

/// Error types for media API operations
#[derive(Debug, Error)]
pub enum MediaApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Authentication error: {0}")]
    Authentication(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Operations the playback core needs from the media server.
#[async_trait]
pub trait MediaApiContract: Send + Sync {
    /// `GET /media/{id}`
    async fn get_media(&self, media_id: &str) -> Result<MediaFile, MediaApiError>;

    /// `GET /media/{id}/url/signed`
    async fn get_signed_urls(&self, media_id: &str) -> Result<SignedUrls, MediaApiError>;

    /// `POST /media`, returning items in server order.
    async fn list_media(&self, request: &MediaRequest) -> Result<Vec<MediaFile>, MediaApiError>;

    /// `PATCH` a fully built checkpoint URL.
    async fn update_position(&self, url: &str) -> Result<(), MediaApiError>;

    /// `GET` a subtitle file as text.
    async fn fetch_subtitle(&self, url: &str) -> Result<String, MediaApiError>;

    /// Unsigned position endpoint used when no signed one is known.
    fn position_endpoint(&self, media_id: &str) -> String;

    /// Turns a server-relative URL into an absolute one.
    fn resolve_url(&self, url: &str) -> String {
        url.to_string()
    }
}

/// reqwest-backed client for the media server
#[derive(Clone)]
pub struct MediaApiClient {
    client: Client,
    server_url: String,
    api_base_url: String,
    access_token: Option<String>,
}

impl MediaApiClient {
    /// Create a new client. `api_base_url` already includes the API path prefix.
    pub fn new(server_url: &str, api_base_url: &str) -> Self {
        let client = match Client::builder().timeout(Duration::from_secs(30)).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(target: API_LOG_TARGET, "Error creating HTTP client with timeout: {:?}. Falling back to default.", e);
                Client::new()
            }
        };

        let server_url = server_url.trim_end_matches('/').to_string();
        let api_base_url = api_base_url.trim_end_matches('/').to_string();
        debug!(target: API_LOG_TARGET, "Created MediaApiClient for {}", api_base_url);

        MediaApiClient {
            client,
            server_url,
            api_base_url,
            access_token: None,
        }
    }

    /// Build a client from application settings.
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        let client = Self::new(&settings.server_url, &settings.api_base_url());
        match &settings.access_token {
            Some(token) => client.with_access_token(token),
            None => client,
        }
    }

    /// Set bearer token for authentication
    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    // --- Private Helper Methods ---

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn checked_url(&self, url: &str) -> Result<String, MediaApiError> {
        let resolved = self.resolve_url(url);
        url::Url::parse(&resolved)
            .map(|_| resolved.clone())
            .map_err(|e| MediaApiError::InvalidUrl(format!("{}: {}", resolved, e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MediaApiError> {
        let url = self.build_url(path);
        debug!(target: API_LOG_TARGET, "Sending GET request to: {}", url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        Self::handle_response(response).await
    }

    /// Maps non-success statuses onto the error taxonomy.
    async fn check_status(response: Response) -> Result<Response, MediaApiError> {
        let status = response.status();
        trace!(target: API_LOG_TARGET, "Response status: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        error!(target: API_LOG_TARGET, "Request failed. Status: {}, Body: {}", status, error_text);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(MediaApiError::Authentication(
                format!("Authentication failed ({}): {}", status, error_text),
            )),
            StatusCode::NOT_FOUND => Err(MediaApiError::NotFound(format!(
                "Resource not found ({}): {}",
                status, error_text
            ))),
            _ => Err(MediaApiError::InvalidResponse(format!(
                "Request failed with status {}: {}",
                status, error_text
            ))),
        }
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, MediaApiError> {
        let response = Self::check_status(response).await?;
        let response_text = response.text().await?;
        if response_text.is_empty() {
            return Err(MediaApiError::InvalidResponse(
                "Empty response body received".to_string(),
            ));
        }

        serde_json::from_str::<T>(&response_text).map_err(|e| {
            error!(target: API_LOG_TARGET, "JSON parsing error: {}", e);
            MediaApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e))
        })
    }
}

#[async_trait]
impl MediaApiContract for MediaApiClient {
    #[instrument(skip(self), fields(media_id = %media_id))]
    async fn get_media(&self, media_id: &str) -> Result<MediaFile, MediaApiError> {
        let path = format!("/media/{}", urlencoding::encode(media_id));
        self.get_json(&path).await
    }

    #[instrument(skip(self), fields(media_id = %media_id))]
    async fn get_signed_urls(&self, media_id: &str) -> Result<SignedUrls, MediaApiError> {
        let path = format!("/media/{}/url/signed", urlencoding::encode(media_id));
        self.get_json(&path).await
    }

    #[instrument(skip(self, request), fields(path = %request.path))]
    async fn list_media(&self, request: &MediaRequest) -> Result<Vec<MediaFile>, MediaApiError> {
        let url = self.build_url("/media");
        debug!(target: API_LOG_TARGET, "Sending POST request to: {}", url);
        let response = self
            .authorize(self.client.post(&url))
            .json(request)
            .send()
            .await?;
        let items: Vec<MediaFile> = Self::handle_response(response).await?;
        debug!(target: API_LOG_TARGET, "Listing under {} returned {} items", request.path, items.len());
        Ok(items)
    }

    async fn update_position(&self, url: &str) -> Result<(), MediaApiError> {
        let url = self.checked_url(url)?;
        trace!(target: API_LOG_TARGET, "Sending PATCH request to: {}", url);
        let response = self.authorize(self.client.patch(&url)).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_subtitle(&self, url: &str) -> Result<String, MediaApiError> {
        let url = self.checked_url(url)?;
        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.text().await?)
    }

    fn position_endpoint(&self, media_id: &str) -> String {
        format!(
            "{}/media/{}/position",
            self.api_base_url,
            urlencoding::encode(media_id)
        )
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.server_url, url)
        } else {
            url.to_string()
        }
    }
}

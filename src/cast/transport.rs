//! Boundary to the casting framework. Everything device-specific sits behind
//! these traits so the controller can run against fakes.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::cast::models::LoadRequest;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CastError {
    #[error("Cast framework not ready")]
    FrameworkUnavailable,
    #[error("No cast session active")]
    NoActiveSession,
    #[error("Failed to create remote player: {0}")]
    RemotePlayer(String),
    #[error("Failed to load media on cast device: {0}")]
    LoadFailed(String),
    #[error("Cast device rejected command: {0}")]
    CommandRejected(String),
    #[error("Failed to send message to receiver: {0}")]
    Message(String),
}

/// Session lifecycle as reported by the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Started,
    StartFailed,
    Resumed,
    Ending,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastSessionEvent {
    pub session_id: String,
    pub state: SessionState,
    pub error: Option<String>,
}

impl CastSessionEvent {
    pub fn new(session_id: impl Into<String>, state: SessionState) -> Self {
        CastSessionEvent {
            session_id: session_id.into(),
            state,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemotePlayerEventKind {
    CurrentTimeChanged,
    DurationChanged,
    IsPausedChanged,
    MediaFinished,
}

impl RemotePlayerEventKind {
    pub const ALL: [RemotePlayerEventKind; 4] = [
        RemotePlayerEventKind::CurrentTimeChanged,
        RemotePlayerEventKind::DurationChanged,
        RemotePlayerEventKind::IsPausedChanged,
        RemotePlayerEventKind::MediaFinished,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemotePlayerEvent {
    CurrentTimeChanged(f64),
    DurationChanged(f64),
    IsPausedChanged(bool),
    MediaFinished,
}

impl RemotePlayerEvent {
    pub fn kind(&self) -> RemotePlayerEventKind {
        match self {
            RemotePlayerEvent::CurrentTimeChanged(_) => RemotePlayerEventKind::CurrentTimeChanged,
            RemotePlayerEvent::DurationChanged(_) => RemotePlayerEventKind::DurationChanged,
            RemotePlayerEvent::IsPausedChanged(_) => RemotePlayerEventKind::IsPausedChanged,
            RemotePlayerEvent::MediaFinished => RemotePlayerEventKind::MediaFinished,
        }
    }
}

pub type ListenerId = u64;
pub type RemotePlayerListener = Arc<dyn Fn(RemotePlayerEvent) + Send + Sync>;

#[async_trait]
pub trait CastTransport: Send + Sync {
    /// Whether the framework has loaded at all.
    fn is_available(&self) -> bool;
    fn current_session(&self) -> Option<Arc<dyn CastSession>>;
    /// A player/controller pair bound to `session`.
    fn create_remote_player(&self, session: &Arc<dyn CastSession>) -> Result<Arc<dyn RemotePlayer>, CastError>;
    async fn end_current_session(&self, stop_casting: bool) -> Result<(), CastError>;
}

#[async_trait]
pub trait CastSession: Send + Sync {
    fn session_id(&self) -> String;
    fn device_name(&self) -> Option<String>;
    async fn load_media(&self, request: LoadRequest) -> Result<(), CastError>;
    async fn send_message(&self, namespace: &str, message: serde_json::Value) -> Result<(), CastError>;
}

#[async_trait]
pub trait RemotePlayer: Send + Sync {
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn set_current_time(&self, seconds: f64);
    /// Seek to the value last given to `set_current_time`.
    async fn seek(&self) -> Result<(), CastError>;
    async fn play_or_pause(&self) -> Result<(), CastError>;
    fn add_event_listener(&self, kind: RemotePlayerEventKind, listener: RemotePlayerListener) -> ListenerId;
    fn remove_event_listener(&self, kind: RemotePlayerEventKind, id: ListenerId);
}

/// Transport for hosts without any casting support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTransport;

#[async_trait]
impl CastTransport for UnavailableTransport {
    fn is_available(&self) -> bool {
        false
    }

    fn current_session(&self) -> Option<Arc<dyn CastSession>> {
        None
    }

    fn create_remote_player(&self, _session: &Arc<dyn CastSession>) -> Result<Arc<dyn RemotePlayer>, CastError> {
        Err(CastError::FrameworkUnavailable)
    }

    async fn end_current_session(&self, _stop_casting: bool) -> Result<(), CastError> {
        Ok(())
    }
}

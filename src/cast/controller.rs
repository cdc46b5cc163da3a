use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::cast::models::{ConnectionState, LoadMediaOptions, RemoteConnection, SET_SUBTITLE_OFFSET};
use crate::cast::transport::{
    CastError, CastSession, CastSessionEvent, CastTransport, ListenerId, RemotePlayer,
    RemotePlayerEvent, RemotePlayerEventKind, SessionState,
};

const CAST_LOG_TARGET: &str = "r_moviecast::cast";

/// A remote player notification tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUpdate {
    pub session_id: String,
    pub event: RemotePlayerEvent,
}

pub type RemoteEventSink = Arc<dyn Fn(RemoteUpdate) + Send + Sync>;

/// Connection changes the orchestrator has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionTransition {
    Connected {
        session_id: String,
        device_name: Option<String>,
    },
    Disconnected {
        session_id: String,
        last_position: f64,
    },
}

struct RegisteredListener {
    kind: RemotePlayerEventKind,
    id: ListenerId,
    player: Arc<dyn RemotePlayer>,
}

struct ActiveRemote {
    session_id: String,
    session: Arc<dyn CastSession>,
    player: Arc<dyn RemotePlayer>,
}

/// Owns the remote player handles and the listeners registered on them.
pub struct RemoteSessionController {
    transport: Arc<dyn CastTransport>,
    namespace: String,
    sink: RemoteEventSink,
    active: Option<ActiveRemote>,
    // Keyed by session id so ending one session never touches another's listeners.
    listeners: HashMap<String, Vec<RegisteredListener>>,
    state_tx: watch::Sender<RemoteConnection>,
}

impl RemoteSessionController {
    pub fn new(transport: Arc<dyn CastTransport>, namespace: impl Into<String>, sink: RemoteEventSink) -> Self {
        let (state_tx, _) = watch::channel(RemoteConnection::default());
        Self {
            transport,
            namespace: namespace.into(),
            sink,
            active: None,
            listeners: HashMap::new(),
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RemoteConnection> {
        self.state_tx.subscribe()
    }

    pub fn connection(&self) -> RemoteConnection {
        self.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.session_id.as_str())
    }

    /// Number of sessions that still have listeners registered.
    pub fn registered_sessions(&self) -> usize {
        self.listeners.len()
    }

    fn update(&self, modify: impl FnOnce(&mut RemoteConnection)) {
        self.state_tx.send_modify(modify);
    }

    fn fail<T>(&self, error: CastError) -> Result<T, CastError> {
        warn!(target: CAST_LOG_TARGET, "Cast error: {}", error);
        let message = error.to_string();
        self.update(|c| c.last_error = Some(message));
        Err(error)
    }

    /// Feed a session state change from the framework.
    #[instrument(skip(self, event), fields(session_id = %event.session_id, state = ?event.state))]
    pub fn handle_session_event(&mut self, event: &CastSessionEvent) -> Option<ConnectionTransition> {
        match event.state {
            SessionState::Starting => {
                if self.active.is_none() {
                    self.update(|c| c.state = ConnectionState::Connecting);
                }
                None
            }
            SessionState::Started | SessionState::Resumed => self.connect(&event.session_id),
            SessionState::StartFailed => {
                let message = event
                    .error
                    .clone()
                    .unwrap_or_else(|| "Failed to start cast session".to_string());
                warn!(target: CAST_LOG_TARGET, "Cast session failed to start: {}", message);
                let connected = self.active.is_some();
                self.update(|c| {
                    if !connected {
                        c.state = ConnectionState::Disconnected;
                    }
                    c.last_error = Some(message);
                });
                None
            }
            SessionState::Ending => None,
            SessionState::Ended => self.disconnect(&event.session_id),
        }
    }

    fn connect(&mut self, session_id: &str) -> Option<ConnectionTransition> {
        if self.active_session_id() == Some(session_id) {
            debug!(target: CAST_LOG_TARGET, "Session {} already connected", session_id);
            return None;
        }

        let session = match self.transport.current_session() {
            Some(session) => session,
            None => {
                let _ = self.fail::<()>(CastError::NoActiveSession);
                self.update(|c| c.state = ConnectionState::Disconnected);
                return None;
            }
        };

        let player = match self.transport.create_remote_player(&session) {
            Ok(player) => player,
            Err(e) => {
                let _ = self.fail::<()>(e);
                self.update(|c| c.state = ConnectionState::Disconnected);
                return None;
            }
        };

        if let Some(previous) = self.active.take() {
            info!(target: CAST_LOG_TARGET, "Session {} replaced by {}", previous.session_id, session_id);
            self.remove_listeners(&previous.session_id);
        }

        let registered = RemotePlayerEventKind::ALL
            .iter()
            .map(|&kind| {
                let sink = self.sink.clone();
                let sid = session_id.to_string();
                let id = player.add_event_listener(
                    kind,
                    Arc::new(move |event: RemotePlayerEvent| {
                        sink(RemoteUpdate {
                            session_id: sid.clone(),
                            event,
                        })
                    }),
                );
                RegisteredListener {
                    kind,
                    id,
                    player: player.clone(),
                }
            })
            .collect();
        self.listeners.insert(session_id.to_string(), registered);

        let device_name = session.device_name();
        info!(target: CAST_LOG_TARGET, "Connected to cast device {:?} (session {})", device_name, session_id);

        let snapshot = RemoteConnection {
            state: ConnectionState::Connected,
            session_id: Some(session_id.to_string()),
            device_name: device_name.clone(),
            position: player.current_time(),
            duration: player.duration(),
            paused: player.is_paused(),
            last_error: None,
        };
        self.state_tx.send_replace(snapshot);

        self.active = Some(ActiveRemote {
            session_id: session_id.to_string(),
            session,
            player,
        });

        Some(ConnectionTransition::Connected {
            session_id: session_id.to_string(),
            device_name,
        })
    }

    fn disconnect(&mut self, session_id: &str) -> Option<ConnectionTransition> {
        self.remove_listeners(session_id);

        if self.active_session_id() != Some(session_id) {
            debug!(target: CAST_LOG_TARGET, "Ignoring end of inactive session {}", session_id);
            return None;
        }

        let recorded = self.state_tx.borrow().position;
        let last_position = self
            .active
            .take()
            .map(|a| a.player.current_time())
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(recorded);

        info!(target: CAST_LOG_TARGET, "Cast session {} ended at {:.1}s", session_id, last_position);
        self.state_tx.send_replace(RemoteConnection::default());

        Some(ConnectionTransition::Disconnected {
            session_id: session_id.to_string(),
            last_position,
        })
    }

    fn remove_listeners(&mut self, session_id: &str) {
        if let Some(registered) = self.listeners.remove(session_id) {
            trace!(target: CAST_LOG_TARGET, "Removing {} listeners of session {}", registered.len(), session_id);
            for listener in registered {
                listener.player.remove_event_listener(listener.kind, listener.id);
            }
        }
    }

    /// Folds a remote player notification into the observable state.
    /// Returns false for notifications from a session that is no longer active.
    pub fn record_event(&mut self, update: &RemoteUpdate) -> bool {
        if self.active_session_id() != Some(update.session_id.as_str()) {
            return false;
        }
        match update.event {
            RemotePlayerEvent::CurrentTimeChanged(t) => self.update(|c| c.position = t),
            RemotePlayerEvent::DurationChanged(d) => self.update(|c| c.duration = d),
            RemotePlayerEvent::IsPausedChanged(p) => self.update(|c| c.paused = p),
            RemotePlayerEvent::MediaFinished => {}
        }
        true
    }

    /// Load media on the connected device, starting at the URL's `#t=` offset.
    #[instrument(skip(self, options), fields(media_id = %options.media_id))]
    pub async fn load_media(&mut self, options: LoadMediaOptions) -> Result<(), CastError> {
        if !self.transport.is_available() {
            return self.fail(CastError::FrameworkUnavailable);
        }
        let session = match &self.active {
            Some(active) => active.session.clone(),
            None => return self.fail(CastError::NoActiveSession),
        };

        let request = options.to_load_request();
        info!(target: CAST_LOG_TARGET, "Loading {} on cast device at {}s", request.media.content_id, request.current_time);
        match session.load_media(request).await {
            Ok(()) => {
                self.update(|c| c.last_error = None);
                Ok(())
            }
            Err(CastError::LoadFailed(reason)) => self.fail(CastError::LoadFailed(reason)),
            Err(other) => self.fail(CastError::LoadFailed(other.to_string())),
        }
    }

    /// No-op when not connected.
    pub async fn seek(&mut self, to_seconds: f64) -> Result<(), CastError> {
        let player = match &self.active {
            Some(active) => active.player.clone(),
            None => {
                debug!(target: CAST_LOG_TARGET, "Ignoring remote seek while disconnected");
                return Ok(());
            }
        };
        player.set_current_time(to_seconds);
        match player.seek().await {
            Ok(()) => {
                self.update(|c| c.position = to_seconds);
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// No-op when not connected.
    pub async fn play_or_pause(&mut self) -> Result<(), CastError> {
        let player = match &self.active {
            Some(active) => active.player.clone(),
            None => {
                debug!(target: CAST_LOG_TARGET, "Ignoring remote play/pause while disconnected");
                return Ok(());
            }
        };
        match player.play_or_pause().await {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    /// Ends the current session. Calling it with nothing connected does nothing.
    #[instrument(skip(self))]
    pub async fn stop_casting(&mut self) -> Result<Option<ConnectionTransition>, CastError> {
        if self.active.is_none() && self.transport.current_session().is_none() {
            debug!(target: CAST_LOG_TARGET, "stop_casting with no session");
            return Ok(None);
        }

        if let Err(e) = self.transport.end_current_session(true).await {
            return self.fail(e);
        }

        let session_id = match self.active_session_id() {
            Some(id) => id.to_string(),
            None => return Ok(None),
        };
        Ok(self.disconnect(&session_id))
    }

    /// Ask the receiver to shift its subtitles.
    pub async fn set_subtitle_offset(&mut self, offset_seconds: f64) -> Result<(), CastError> {
        let session = match &self.active {
            Some(active) => active.session.clone(),
            None => return self.fail(CastError::NoActiveSession),
        };
        let message = json!({ "type": SET_SUBTITLE_OFFSET, "offsetSeconds": offset_seconds });
        debug!(target: CAST_LOG_TARGET, "Sending {} to {}", message, self.namespace);
        match session.send_message(&self.namespace, message).await {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }
}

impl Drop for RemoteSessionController {
    fn drop(&mut self) {
        let sessions: Vec<String> = self.listeners.keys().cloned().collect();
        for session_id in sessions {
            self.remove_listeners(&session_id);
        }
    }
}

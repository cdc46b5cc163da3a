use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

use crate::backend::{MediaFile, SignedUrls};
use crate::cast::{CastSessionEvent, RemoteConnection, RemoteUpdate};
use crate::config::Settings;
use crate::player::surface::LocalEvent;

/// Which mechanism is rendering the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Loading,
    ResumePrompt,
    PlayingLocal,
    PlayingRemote,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    StartOver,
}

/// One watchable item, fixed for the lifetime of a watch session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackTarget {
    pub media_id: String,
    pub title: String,
    pub stream_url: String,
    pub content_type: Option<String>,
    pub poster_url: Option<String>,
    pub subtitle_url: Option<String>,
    pub update_position_url: Option<String>,
    /// Seconds; unknown until a surface reports it unless the server knew it.
    pub duration: Option<f64>,
    pub resume_position: f64,
    pub parent_path: Option<String>,
    pub is_episode: bool,
}

impl PlaybackTarget {
    /// Combine media metadata (if it could be fetched) with the signed URIs.
    pub fn from_parts(
        media_id: &str,
        media: Option<&MediaFile>,
        urls: &SignedUrls,
        resolve: impl Fn(&str) -> String,
    ) -> Self {
        PlaybackTarget {
            media_id: media_id.to_string(),
            title: media
                .map(|m| m.title())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| media_id.to_string()),
            stream_url: resolve(&urls.stream),
            content_type: urls.stream_content_type.clone(),
            poster_url: urls.poster.as_deref().map(&resolve),
            subtitle_url: urls.subtitle.as_deref().map(&resolve),
            update_position_url: Some(resolve(&urls.update_position)),
            duration: media.and_then(|m| m.known_duration()),
            resume_position: media.map(|m| m.resume_position() as f64).unwrap_or(0.0),
            parent_path: media.and_then(|m| m.parent_path.clone()),
            is_episode: media.map(|m| m.is_episode()).unwrap_or(false),
        }
    }
}

/// One watch attempt on one surface. A surface switch starts a new session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub id: u64,
    pub target: Arc<PlaybackTarget>,
    pub surface: Surface,
    pub position: f64,
    pub duration: Option<f64>,
    pub paused: bool,
    pub start_offset: f64,
}

impl PlaybackSession {
    pub fn new(id: u64, target: Arc<PlaybackTarget>, surface: Surface, start_offset: f64) -> Self {
        PlaybackSession {
            id,
            duration: target.duration,
            target,
            surface,
            position: start_offset,
            paused: false,
            start_offset,
        }
    }
}

/// Commands that can be sent to the Player task.
#[derive(Debug)]
pub enum PlayerCommand {
    Select { media_id: String },
    ResumeChoice(ResumeChoice),
    /// Event from the local surface, tagged with the session it was loaded for.
    Local { session_id: u64, event: LocalEvent },
    CastSession(CastSessionEvent),
    Remote(RemoteUpdate),
    Seek(f64),
    PlayPauseToggle,
    StopCasting,
    SetSubtitleOffset(f64),
    SetAutoPlay(bool),
    CancelAutoPlay,
    CountdownTick { countdown_id: u64, remaining: u32 },
    CountdownElapsed { countdown_id: u64 },
    Exit,
    GetState(oneshot::Sender<PlayerStateSnapshot>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountdownState {
    pub next_media_id: String,
    pub remaining: u32,
}

/// Full observable state of the player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStateSnapshot {
    pub phase: PlaybackPhase,
    pub target: Option<PlaybackTarget>,
    pub session: Option<PlaybackSession>,
    pub remote: RemoteConnection,
    pub countdown: Option<CountdownState>,
    pub subtitle_offset: f64,
}

/// Updates broadcast by the Player task about its state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerUpdate {
    PhaseChanged(PlaybackPhase),
    ResumePrompt {
        media_id: String,
        resume_position: f64,
        duration: Option<f64>,
    },
    SessionStarted {
        media_id: String,
        surface: Surface,
        start_offset: f64,
    },
    Progress {
        media_id: String,
        surface: Surface,
        position: f64,
        duration: Option<f64>,
    },
    LoadFailed {
        media_id: String,
        error: String,
    },
    CastConnected {
        device_name: Option<String>,
    },
    CastDisconnected {
        last_position: f64,
    },
    CastError(String),
    Ended {
        media_id: String,
        next_media_id: Option<String>,
    },
    Countdown {
        next_media_id: String,
        remaining: u32,
    },
    CountdownCancelled,
    SubtitleOffsetApplied {
        surface: Surface,
        offset_seconds: f64,
    },
    Stopped,
}

/// Tunables the player reads from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub checkpoint_interval: Duration,
    pub remote_checkpoint_interval: Duration,
    pub countdown_ticks: u32,
    pub countdown_tick: Duration,
    pub carry_remote_position: bool,
    pub subtitle_refresh_delay: Duration,
    pub client_id: String,
    pub cast_namespace: String,
    pub state_update_capacity: usize,
    pub command_buffer_size: usize,
}

const FALLBACK_REMOTE_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(10);
const FALLBACK_COUNTDOWN_TICK: Duration = Duration::from_secs(1);

impl PlayerConfig {
    /// Replaces values the player cannot run with: zero timer periods and zero
    /// channel sizes.
    pub fn normalized(mut self) -> Self {
        if self.remote_checkpoint_interval.is_zero() {
            warn!(target: crate::player::PLAYER_LOG_TARGET, "Zero remote checkpoint interval, using {:?}", FALLBACK_REMOTE_CHECKPOINT_INTERVAL);
            self.remote_checkpoint_interval = FALLBACK_REMOTE_CHECKPOINT_INTERVAL;
        }
        if self.countdown_tick.is_zero() {
            warn!(target: crate::player::PLAYER_LOG_TARGET, "Zero countdown tick, using {:?}", FALLBACK_COUNTDOWN_TICK);
            self.countdown_tick = FALLBACK_COUNTDOWN_TICK;
        }
        self.state_update_capacity = self.state_update_capacity.max(1);
        self.command_buffer_size = self.command_buffer_size.max(1);
        self
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig::from(&Settings::default())
    }
}

impl From<&Settings> for PlayerConfig {
    fn from(settings: &Settings) -> Self {
        PlayerConfig {
            checkpoint_interval: settings.checkpoint_interval(),
            remote_checkpoint_interval: settings.remote_checkpoint_interval(),
            countdown_ticks: settings.autoplay_countdown_secs,
            countdown_tick: Duration::from_secs(1),
            carry_remote_position: settings.carry_remote_position_on_disconnect,
            subtitle_refresh_delay: settings.subtitle_refresh_delay(),
            client_id: settings.client_id.clone(),
            cast_namespace: settings.cast_namespace.clone(),
            state_update_capacity: 64,
            command_buffer_size: 64,
        }
    }
}

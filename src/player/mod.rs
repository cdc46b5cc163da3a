//! Playback orchestration: one actor task owning the playback state machine.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use crate::backend::MediaApiContract;
use crate::cast::{CastTransport, RemoteEventSink, RemoteSessionController, RemoteUpdate};
use crate::progress::{CheckpointClient, LocalStore};

mod command_handler;
mod countdown;
mod item_fetcher;
mod next_episode;
mod playback_starter;
mod run_loop;
mod subtitle_worker;
pub mod state;
pub mod surface;

pub use next_episode::following_item;
pub use state::{
    CountdownState, PlaybackPhase, PlaybackSession, PlaybackTarget, PlayerCommand, PlayerConfig,
    PlayerStateSnapshot, PlayerUpdate, ResumeChoice, Surface,
};
pub use surface::{HeadlessSurface, LocalEvent, LocalSurface, SurfaceError, SurfaceEventSink};

const PLAYER_LOG_TARGET: &str = "r_moviecast::player";

/// Decides where media plays, keeps positions flowing into checkpoints and
/// drives the resume and auto-play decisions.
pub struct Player {
    // --- Collaborators ---
    api: Arc<dyn MediaApiContract>,
    surface: Arc<dyn LocalSurface>,
    remote: RemoteSessionController,
    checkpoints: CheckpointClient,
    store: Arc<LocalStore>,
    config: PlayerConfig,

    // --- State ---
    phase: PlaybackPhase,
    target: Option<Arc<PlaybackTarget>>,
    session: Option<PlaybackSession>,
    next_session_id: u64,
    last_checkpoint: Option<Instant>,
    countdown: Option<countdown::CountdownTask>,
    next_countdown_id: u64,
    subtitle_offset: f64,
    subtitles: Option<subtitle_worker::SubtitleWorker>,

    // --- Communication ---
    command_rx: mpsc::Receiver<PlayerCommand>,
    state_update_tx: broadcast::Sender<PlayerUpdate>,
    internal_command_tx: mpsc::Sender<PlayerCommand>,
}

impl Player {
    /// Creates a new Player and the sender for its commands.
    /// Run it in its own task with `Player::run`.
    pub fn new(
        api: Arc<dyn MediaApiContract>,
        surface: Arc<dyn LocalSurface>,
        transport: Arc<dyn CastTransport>,
        store: Arc<LocalStore>,
        config: PlayerConfig,
    ) -> (Self, mpsc::Sender<PlayerCommand>) {
        let config = config.normalized();
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer_size);
        let (state_update_tx, _) = broadcast::channel(config.state_update_capacity);

        let remote = RemoteSessionController::new(
            transport,
            config.cast_namespace.clone(),
            remote_event_sink(command_tx.clone()),
        );

        let player = Player {
            checkpoints: CheckpointClient::new(api.clone(), store.clone()),
            api,
            surface,
            remote,
            store,
            config,
            phase: PlaybackPhase::Idle,
            target: None,
            session: None,
            next_session_id: 0,
            last_checkpoint: None,
            countdown: None,
            next_countdown_id: 0,
            subtitle_offset: 0.0,
            subtitles: None,
            command_rx,
            state_update_tx,
            internal_command_tx: command_tx.clone(),
        };

        (player, command_tx)
    }

    pub fn subscribe_state_updates(&self) -> broadcast::Receiver<PlayerUpdate> {
        self.state_update_tx.subscribe()
    }

    fn broadcast_update(&self, update: PlayerUpdate) {
        trace!(target: PLAYER_LOG_TARGET, "Broadcasting state update: {:?}", update);
        if self.state_update_tx.send(update.clone()).is_err() {
            debug!(target: PLAYER_LOG_TARGET, "No active listeners for state update: {:?}", update);
        }
    }

    fn set_phase(&mut self, phase: PlaybackPhase) {
        if self.phase != phase {
            debug!(target: PLAYER_LOG_TARGET, "Phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
            self.broadcast_update(PlayerUpdate::PhaseChanged(phase));
        }
    }

    fn allocate_session_id(&mut self) -> u64 {
        self.next_session_id += 1;
        self.next_session_id
    }

    fn is_remote_playing(&self) -> bool {
        self.phase == PlaybackPhase::PlayingRemote && self.session.as_ref().is_some_and(|s| !s.paused)
    }

    fn full_state(&self) -> PlayerStateSnapshot {
        PlayerStateSnapshot {
            phase: self.phase,
            target: self.target.as_deref().cloned(),
            session: self.session.clone(),
            remote: self.remote.connection(),
            countdown: self.countdown.as_ref().map(|c| CountdownState {
                next_media_id: c.next_media_id().to_string(),
                remaining: c.remaining(),
            }),
            subtitle_offset: self.subtitle_offset,
        }
    }

    /// Runs the command loop. Spawn this as a Tokio task.
    #[instrument(skip(self))]
    pub async fn run(&mut self) {
        run_loop::run_player_loop(self).await;
    }
}

fn remote_event_sink(tx: mpsc::Sender<PlayerCommand>) -> RemoteEventSink {
    Arc::new(move |update: RemoteUpdate| {
        if let Err(e) = tx.try_send(PlayerCommand::Remote(update)) {
            tracing::warn!(target: PLAYER_LOG_TARGET, "Dropping remote player event: {}", e);
        }
    })
}

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{command_handler, Player, PlayerUpdate, PLAYER_LOG_TARGET};
use crate::cast::{with_start_fragment, LoadMediaOptions};
use crate::player::state::{PlaybackPhase, PlaybackSession, PlaybackTarget, PlayerCommand, Surface};
use crate::player::surface::{LocalEvent, SurfaceEventSink};

/// Routes local surface events into the player, tagged with the session they belong to.
fn local_event_sink(player: &Player, session_id: u64) -> SurfaceEventSink {
    let cmd_tx = player.internal_command_tx.clone();
    Arc::new(move |event: LocalEvent| {
        if let Err(e) = cmd_tx.try_send(PlayerCommand::Local { session_id, event }) {
            warn!(target: PLAYER_LOG_TARGET, session_id, "Dropping local surface event {:?}: {}", event, e);
        }
    })
}

fn load_options(target: &PlaybackTarget, start_offset: f64) -> LoadMediaOptions {
    LoadMediaOptions {
        url: with_start_fragment(&target.stream_url, start_offset),
        title: target.title.clone(),
        poster_url: target.poster_url.clone(),
        content_type: target.content_type.clone(),
        subtitle_url: target.subtitle_url.clone(),
        update_position_url: target.update_position_url.clone(),
        media_id: target.media_id.clone(),
    }
}

fn begin_session(player: &mut Player, target: Arc<PlaybackTarget>, surface: Surface, start_offset: f64) {
    let id = player.allocate_session_id();
    info!(target: PLAYER_LOG_TARGET, session_id = id, "Playing {} on {:?} surface from {:.0}s", target.media_id, surface, start_offset);
    player.broadcast_update(PlayerUpdate::SessionStarted {
        media_id: target.media_id.clone(),
        surface,
        start_offset,
    });
    player.session = Some(PlaybackSession::new(id, target, surface, start_offset));
    // A new session checkpoints on its first progress report.
    player.last_checkpoint = None;
    player.set_phase(match surface {
        Surface::Local => PlaybackPhase::PlayingLocal,
        Surface::Remote => PlaybackPhase::PlayingRemote,
    });
}

async fn start_local(player: &mut Player, target: Arc<PlaybackTarget>, start_offset: f64) -> bool {
    let session_id = player.next_session_id + 1;
    let sink = local_event_sink(player, session_id);
    let url = with_start_fragment(&target.stream_url, start_offset);
    match player.surface.load(&url, start_offset, sink).await {
        Ok(()) => {
            begin_session(player, target, Surface::Local, start_offset);
            true
        }
        Err(e) => {
            error!(target: PLAYER_LOG_TARGET, "Local load of {} failed: {}", target.media_id, e);
            player.session = None;
            player.broadcast_update(PlayerUpdate::LoadFailed {
                media_id: target.media_id.clone(),
                error: e.to_string(),
            });
            player.set_phase(PlaybackPhase::Idle);
            false
        }
    }
}

async fn start_remote(player: &mut Player, target: Arc<PlaybackTarget>, start_offset: f64) -> bool {
    match player.remote.load_media(load_options(&target, start_offset)).await {
        Ok(()) => {
            begin_session(player, target, Surface::Remote, start_offset);
            true
        }
        Err(e) => {
            let message = player
                .remote
                .connection()
                .error_message()
                .unwrap_or_else(|| e.to_string());
            player.broadcast_update(PlayerUpdate::CastError(message));
            false
        }
    }
}

/// Starts the current target on whichever surface is active: the remote device
/// when connected, the local surface otherwise (and as fallback).
#[instrument(skip(player))]
pub async fn play_current_target(player: &mut Player, start_offset: f64) {
    let target = match player.target.clone() {
        Some(target) => target,
        None => {
            warn!(target: PLAYER_LOG_TARGET, "No target to play");
            player.set_phase(PlaybackPhase::Idle);
            return;
        }
    };

    if player.remote.is_connected() {
        if start_remote(player, target.clone(), start_offset).await {
            command_handler::reapply_subtitle_offset(player).await;
            return;
        }
        warn!(target: PLAYER_LOG_TARGET, "Falling back to local playback of {}", target.media_id);
    }
    if start_local(player, target, start_offset).await {
        command_handler::reapply_subtitle_offset(player).await;
    }
}

/// Moves a local session onto the newly connected device at the current position.
/// The local surface is paused before the remote load is issued.
#[instrument(skip(player))]
pub async fn hand_over_to_remote(player: &mut Player) {
    let (target, position, surface) = match &player.session {
        Some(s) => (s.target.clone(), s.position, s.surface),
        None => return,
    };

    if surface == Surface::Local {
        player.surface.pause().await;
    }

    if start_remote(player, target, position).await {
        command_handler::reapply_subtitle_offset(player).await;
        return;
    }

    if surface == Surface::Local {
        warn!(target: PLAYER_LOG_TARGET, "Remote takeover failed, continuing locally");
        player.surface.resume().await;
    }
}

/// Resumes on the local surface after the remote session ended.
#[instrument(skip(player))]
pub async fn return_to_local(player: &mut Player, last_remote_position: f64) {
    let session = match player.session.take() {
        Some(s) if s.surface == Surface::Remote => s,
        other => {
            player.session = other;
            return;
        }
    };

    let resume_at = if player.config.carry_remote_position && last_remote_position > 0.0 {
        last_remote_position
    } else {
        session.start_offset
    };
    info!(target: PLAYER_LOG_TARGET, "Returning {} to local playback at {:.0}s", session.target.media_id, resume_at);
    if start_local(player, session.target, resume_at).await {
        command_handler::reapply_subtitle_offset(player).await;
    }
}

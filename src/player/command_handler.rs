use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use super::subtitle_worker::SubtitleWorker;
use super::{countdown, item_fetcher, next_episode, playback_starter, Player, PlayerUpdate, PLAYER_LOG_TARGET};
use crate::cast::{CastSessionEvent, ConnectionTransition, RemotePlayerEvent, RemoteUpdate, SessionState};
use crate::player::state::{PlaybackPhase, PlaybackSession, ResumeChoice, Surface};
use crate::player::surface::LocalEvent;
use crate::subtitle::SubtitleOffsetApplier;

// --- Checkpoints ---

const FINAL_CHECKPOINT_WAIT: Duration = Duration::from_secs(2);

/// Issues a checkpoint for the active session regardless of the throttle.
pub fn checkpoint_now(player: &mut Player) -> Option<JoinHandle<()>> {
    let session = player.session.as_ref()?;
    let handle = player
        .checkpoints
        .checkpoint(&session.target.media_id, session.position, session.duration)?;
    player.last_checkpoint = Some(Instant::now());
    Some(handle)
}

fn maybe_checkpoint(player: &mut Player) {
    let due = player
        .last_checkpoint
        .map_or(true, |at| at.elapsed() >= player.config.checkpoint_interval);
    if due {
        checkpoint_now(player);
    }
}

/// The session that is currently rendering on `surface`, if playback is running there.
fn playing_session(player: &mut Player, surface: Surface) -> Option<&mut PlaybackSession> {
    let expected = match surface {
        Surface::Local => PlaybackPhase::PlayingLocal,
        Surface::Remote => PlaybackPhase::PlayingRemote,
    };
    if player.phase != expected {
        return None;
    }
    player.session.as_mut().filter(|s| s.surface == surface)
}

fn record_progress(player: &mut Player, surface: Surface, position: f64, duration: Option<f64>) {
    if !position.is_finite() || position < 0.0 {
        return;
    }
    let Some(session) = playing_session(player, surface) else { return };
    session.position = position;
    if let Some(d) = duration.filter(|d| d.is_finite() && *d > 0.0) {
        session.duration = Some(d);
    }
    let update = PlayerUpdate::Progress {
        media_id: session.target.media_id.clone(),
        surface,
        position,
        duration: session.duration,
    };
    player.broadcast_update(update);
    maybe_checkpoint(player);
}

fn record_duration(player: &mut Player, surface: Surface, duration: f64) {
    if !duration.is_finite() || duration <= 0.0 {
        return;
    }
    if let Some(session) = playing_session(player, surface) {
        session.duration = Some(duration);
    }
}

fn record_paused(player: &mut Player, surface: Surface, paused: bool) {
    if let Some(session) = playing_session(player, surface) {
        session.paused = paused;
    }
}

/// Final checkpoint, then stop rendering locally. The remote device is left
/// alone: it either gets the next load or keeps its session.
async fn finish_session(player: &mut Player) -> Option<JoinHandle<()>> {
    let pending = if matches!(player.phase, PlaybackPhase::PlayingLocal | PlaybackPhase::PlayingRemote) {
        checkpoint_now(player)
    } else {
        None
    };
    if let Some(session) = player.session.take() {
        if session.surface == Surface::Local {
            player.surface.stop().await;
        }
    }
    pending
}

fn cancel_countdown(player: &mut Player) -> bool {
    match player.countdown.take() {
        Some(task) => {
            task.cancel();
            true
        }
        None => false,
    }
}

async fn reset_subtitles(player: &mut Player) {
    if let Some(worker) = player.subtitles.take() {
        worker.stop().await;
    }
    player.subtitle_offset = 0.0;
}

/// Drops the signed position endpoint of the target being left.
fn forget_target(player: &mut Player) {
    if let Some(target) = player.target.take() {
        player.checkpoints.forget_endpoint(&target.media_id);
    }
}

// --- Target selection ---

#[instrument(skip(player), fields(media_id = %media_id))]
pub async fn handle_select(player: &mut Player, media_id: String) {
    info!(target: PLAYER_LOG_TARGET, "Selecting {}", media_id);
    cancel_countdown(player);
    finish_session(player).await;

    if player.target.as_ref().map(|t| t.media_id.as_str()) != Some(media_id.as_str()) {
        reset_subtitles(player).await;
    }
    forget_target(player);
    player.set_phase(PlaybackPhase::Loading);

    let target = match item_fetcher::fetch_target(player.api.clone(), &player.store, &media_id).await {
        Ok(target) => target,
        Err(e) => {
            error!(target: PLAYER_LOG_TARGET, "Failed to load {}: {}", media_id, e);
            player.broadcast_update(PlayerUpdate::LoadFailed {
                media_id,
                error: e.to_string(),
            });
            player.set_phase(PlaybackPhase::Idle);
            return;
        }
    };

    if let Some(endpoint) = &target.update_position_url {
        player.checkpoints.register_endpoint(&target.media_id, endpoint);
    }
    let resume_position = target.resume_position;
    let duration = target.duration;
    player.target = Some(Arc::new(target));

    if resume_position > 0.0 {
        player.set_phase(PlaybackPhase::ResumePrompt);
        player.broadcast_update(PlayerUpdate::ResumePrompt {
            media_id,
            resume_position,
            duration,
        });
    } else {
        playback_starter::play_current_target(player, 0.0).await;
    }
}

#[instrument(skip(player))]
pub async fn handle_resume_choice(player: &mut Player, choice: ResumeChoice) {
    if player.phase != PlaybackPhase::ResumePrompt {
        debug!(target: PLAYER_LOG_TARGET, "Ignoring resume choice outside the prompt");
        return;
    }
    let start_offset = match (choice, &player.target) {
        (ResumeChoice::Resume, Some(target)) => target.resume_position,
        _ => 0.0,
    };
    playback_starter::play_current_target(player, start_offset).await;
}

// --- Surface events ---

pub async fn handle_local_event(player: &mut Player, session_id: u64, event: LocalEvent) {
    if player.session.as_ref().map(|s| s.id) != Some(session_id) {
        trace!(target: PLAYER_LOG_TARGET, session_id, "Ignoring local event from an old session: {:?}", event);
        return;
    }
    match event {
        LocalEvent::Progress { position, duration } => record_progress(player, Surface::Local, position, duration),
        LocalEvent::DurationChanged(d) => record_duration(player, Surface::Local, d),
        LocalEvent::Paused(p) => record_paused(player, Surface::Local, p),
        LocalEvent::Ended => {
            if player.phase == PlaybackPhase::PlayingLocal {
                handle_media_ended(player).await;
            }
        }
    }
}

pub async fn handle_remote_update(player: &mut Player, update: RemoteUpdate) {
    if !player.remote.record_event(&update) {
        trace!(target: PLAYER_LOG_TARGET, "Ignoring event of inactive cast session {}", update.session_id);
        return;
    }
    match update.event {
        RemotePlayerEvent::CurrentTimeChanged(t) => record_progress(player, Surface::Remote, t, None),
        RemotePlayerEvent::DurationChanged(d) => record_duration(player, Surface::Remote, d),
        RemotePlayerEvent::IsPausedChanged(p) => record_paused(player, Surface::Remote, p),
        RemotePlayerEvent::MediaFinished => {
            if player.phase == PlaybackPhase::PlayingRemote {
                handle_media_ended(player).await;
            }
        }
    }
}

// --- End of media and auto-play ---

#[instrument(skip(player))]
async fn handle_media_ended(player: &mut Player) {
    let Some(target) = player.session.as_ref().map(|s| s.target.clone()) else { return };
    info!(target: PLAYER_LOG_TARGET, "Finished {}", target.media_id);
    checkpoint_now(player);
    player.set_phase(PlaybackPhase::Ended);

    let next = if target.is_episode && player.store.autoplay_next() {
        next_episode::resolve_next_episode(player.api.clone(), &target, &player.config.client_id).await
    } else {
        None
    };
    let next_media_id = next.map(|m| m.media_file_id);

    player.broadcast_update(PlayerUpdate::Ended {
        media_id: target.media_id.clone(),
        next_media_id: next_media_id.clone(),
    });

    if let Some(next_media_id) = next_media_id {
        start_countdown(player, next_media_id).await;
    }
}

async fn start_countdown(player: &mut Player, next_media_id: String) {
    let ticks = player.config.countdown_ticks;
    if ticks == 0 {
        advance_to(player, next_media_id).await;
        return;
    }
    player.next_countdown_id += 1;
    player.broadcast_update(PlayerUpdate::Countdown {
        next_media_id: next_media_id.clone(),
        remaining: ticks,
    });
    player.countdown = Some(countdown::spawn_countdown(
        player.next_countdown_id,
        next_media_id,
        ticks,
        player.config.countdown_tick,
        player.internal_command_tx.clone(),
    ));
}

async fn advance_to(player: &mut Player, next_media_id: String) {
    info!(target: PLAYER_LOG_TARGET, "Auto-playing {}", next_media_id);
    finish_session(player).await;
    player.set_phase(PlaybackPhase::Idle);
    handle_select(player, next_media_id).await;
}

pub fn handle_countdown_tick(player: &mut Player, countdown_id: u64, remaining: u32) {
    let Some(task) = player.countdown.as_mut().filter(|c| c.id() == countdown_id) else {
        trace!(target: PLAYER_LOG_TARGET, countdown_id, "Ignoring tick of a cancelled countdown");
        return;
    };
    task.set_remaining(remaining);
    let update = PlayerUpdate::Countdown {
        next_media_id: task.next_media_id().to_string(),
        remaining,
    };
    player.broadcast_update(update);
}

pub async fn handle_countdown_elapsed(player: &mut Player, countdown_id: u64) {
    if player.countdown.as_ref().map(|c| c.id()) != Some(countdown_id) {
        trace!(target: PLAYER_LOG_TARGET, countdown_id, "Ignoring expiry of a cancelled countdown");
        return;
    }
    if let Some(task) = player.countdown.take() {
        let next_media_id = task.next_media_id().to_string();
        drop(task);
        advance_to(player, next_media_id).await;
    }
}

pub fn handle_cancel_autoplay(player: &mut Player) {
    if cancel_countdown(player) {
        info!(target: PLAYER_LOG_TARGET, "Auto-play cancelled");
        player.broadcast_update(PlayerUpdate::CountdownCancelled);
    }
}

pub fn handle_set_autoplay(player: &mut Player, enabled: bool) {
    if let Err(e) = player.store.set_autoplay_next(enabled) {
        warn!(target: PLAYER_LOG_TARGET, "Failed to persist auto-play preference: {}", e);
    }
    if !enabled {
        handle_cancel_autoplay(player);
    }
}

// --- Cast session lifecycle ---

#[instrument(skip(player, event), fields(session_id = %event.session_id, state = ?event.state))]
pub async fn handle_cast_session(player: &mut Player, event: CastSessionEvent) {
    let transition = player.remote.handle_session_event(&event);
    match transition {
        Some(ConnectionTransition::Connected { device_name, .. }) => {
            player.broadcast_update(PlayerUpdate::CastConnected { device_name });
            if matches!(player.phase, PlaybackPhase::PlayingLocal | PlaybackPhase::PlayingRemote) {
                playback_starter::hand_over_to_remote(player).await;
            }
        }
        Some(ConnectionTransition::Disconnected { last_position, .. }) => {
            on_disconnected(player, last_position).await;
        }
        None => {
            let failed = matches!(
                event.state,
                SessionState::Started | SessionState::Resumed | SessionState::StartFailed
            );
            if failed {
                if let Some(message) = player.remote.connection().error_message() {
                    player.broadcast_update(PlayerUpdate::CastError(message));
                }
            }
        }
    }
}

async fn on_disconnected(player: &mut Player, last_position: f64) {
    player.broadcast_update(PlayerUpdate::CastDisconnected { last_position });
    if player.phase != PlaybackPhase::PlayingRemote {
        return;
    }
    if let Some(session) = player.session.as_mut() {
        if last_position.is_finite() && last_position > 0.0 {
            session.position = last_position;
        }
    }
    checkpoint_now(player);
    playback_starter::return_to_local(player, last_position).await;
}

pub async fn handle_stop_casting(player: &mut Player) {
    match player.remote.stop_casting().await {
        Ok(Some(ConnectionTransition::Disconnected { last_position, .. })) => {
            on_disconnected(player, last_position).await;
        }
        Ok(_) => {}
        Err(e) => player.broadcast_update(PlayerUpdate::CastError(e.to_string())),
    }
}

// --- Transport controls ---

pub async fn handle_seek(player: &mut Player, to_seconds: f64) {
    if !to_seconds.is_finite() || to_seconds < 0.0 {
        warn!(target: PLAYER_LOG_TARGET, "Ignoring seek to {}", to_seconds);
        return;
    }
    let surface = match player.phase {
        PlaybackPhase::PlayingLocal => Surface::Local,
        PlaybackPhase::PlayingRemote => Surface::Remote,
        _ => return,
    };
    match surface {
        Surface::Local => player.surface.seek(to_seconds).await,
        Surface::Remote => {
            if let Err(e) = player.remote.seek(to_seconds).await {
                player.broadcast_update(PlayerUpdate::CastError(e.to_string()));
                return;
            }
        }
    }
    if let Some(session) = playing_session(player, surface) {
        session.position = to_seconds;
    }
}

pub async fn handle_play_pause_toggle(player: &mut Player) {
    match player.phase {
        PlaybackPhase::PlayingLocal => {
            let Some(paused) = player.session.as_ref().map(|s| s.paused) else { return };
            if paused {
                player.surface.resume().await;
            } else {
                player.surface.pause().await;
            }
            record_paused(player, Surface::Local, !paused);
        }
        PlaybackPhase::PlayingRemote => {
            if let Err(e) = player.remote.play_or_pause().await {
                player.broadcast_update(PlayerUpdate::CastError(e.to_string()));
            }
        }
        _ => debug!(target: PLAYER_LOG_TARGET, "Nothing playing to toggle"),
    }
}

// --- Subtitles ---

#[instrument(skip(player))]
pub async fn handle_set_subtitle_offset(player: &mut Player, offset_seconds: f64) {
    if !offset_seconds.is_finite() {
        warn!(target: PLAYER_LOG_TARGET, "Ignoring subtitle offset {}", offset_seconds);
        return;
    }
    player.subtitle_offset = offset_seconds;

    if player.phase == PlaybackPhase::PlayingRemote {
        match player.remote.set_subtitle_offset(offset_seconds).await {
            Ok(()) => player.broadcast_update(PlayerUpdate::SubtitleOffsetApplied {
                surface: Surface::Remote,
                offset_seconds,
            }),
            Err(e) => player.broadcast_update(PlayerUpdate::CastError(e.to_string())),
        }
        return;
    }

    if player.subtitles.is_none() {
        let Some(host) = player.surface.track_host() else {
            debug!(target: PLAYER_LOG_TARGET, "Local surface has no text tracks");
            return;
        };
        let applier = SubtitleOffsetApplier::new(player.api.clone(), host, player.config.subtitle_refresh_delay);
        player.subtitles = Some(SubtitleWorker::spawn(applier, player.state_update_tx.clone()));
    }
    if let Some(worker) = &player.subtitles {
        if !worker.submit(offset_seconds) {
            warn!(target: PLAYER_LOG_TARGET, "Subtitle worker is gone, offset {} dropped", offset_seconds);
        }
    }
}

/// Puts a non-zero subtitle offset back in place after playback moved to another surface.
pub async fn reapply_subtitle_offset(player: &mut Player) {
    let offset = player.subtitle_offset;
    if offset != 0.0 {
        debug!(target: PLAYER_LOG_TARGET, "Re-applying subtitle offset {}s on the new surface", offset);
        handle_set_subtitle_offset(player, offset).await;
    }
}

// --- Exit ---

#[instrument(skip(player))]
pub async fn handle_exit(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Leaving playback");
    cancel_countdown(player);
    let pending = finish_session(player).await;
    reset_subtitles(player).await;
    forget_target(player);
    if let Some(handle) = pending {
        if tokio::time::timeout(FINAL_CHECKPOINT_WAIT, handle).await.is_err() {
            warn!(target: PLAYER_LOG_TARGET, "Final checkpoint still in flight after {:?}", FINAL_CHECKPOINT_WAIT);
        }
    }
    player.set_phase(PlaybackPhase::Idle);
    player.broadcast_update(PlayerUpdate::Stopped);
}

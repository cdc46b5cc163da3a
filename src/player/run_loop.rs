use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, trace};

use super::{command_handler, Player, PlayerCommand, PLAYER_LOG_TARGET};

/// Runs the player's command processing loop.
pub async fn run_player_loop(player: &mut Player) {
    info!(target: PLAYER_LOG_TARGET, "Player run loop started.");

    // Remote surfaces report time sparsely; checkpoint them on a timer as well.
    let period = player.config.remote_checkpoint_interval;
    let mut remote_checkpoint_interval = interval_at(Instant::now() + period, period);
    remote_checkpoint_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            Some(command) = player.command_rx.recv() => {
                trace!(target: PLAYER_LOG_TARGET, "Received command: {:?}", command);
                match command {
                    PlayerCommand::Select { media_id } => command_handler::handle_select(player, media_id).await,
                    PlayerCommand::ResumeChoice(choice) => command_handler::handle_resume_choice(player, choice).await,
                    PlayerCommand::Local { session_id, event } => command_handler::handle_local_event(player, session_id, event).await,
                    PlayerCommand::CastSession(event) => command_handler::handle_cast_session(player, event).await,
                    PlayerCommand::Remote(update) => command_handler::handle_remote_update(player, update).await,
                    PlayerCommand::Seek(to_seconds) => command_handler::handle_seek(player, to_seconds).await,
                    PlayerCommand::PlayPauseToggle => command_handler::handle_play_pause_toggle(player).await,
                    PlayerCommand::StopCasting => command_handler::handle_stop_casting(player).await,
                    PlayerCommand::SetSubtitleOffset(offset) => command_handler::handle_set_subtitle_offset(player, offset).await,
                    PlayerCommand::SetAutoPlay(enabled) => command_handler::handle_set_autoplay(player, enabled),
                    PlayerCommand::CancelAutoPlay => command_handler::handle_cancel_autoplay(player),
                    PlayerCommand::CountdownTick { countdown_id, remaining } => command_handler::handle_countdown_tick(player, countdown_id, remaining),
                    PlayerCommand::CountdownElapsed { countdown_id } => command_handler::handle_countdown_elapsed(player, countdown_id).await,
                    PlayerCommand::Exit => command_handler::handle_exit(player).await,
                    PlayerCommand::GetState(responder) => {
                        let _ = responder.send(player.full_state());
                    }
                    PlayerCommand::Shutdown => {
                        info!(target: PLAYER_LOG_TARGET, "Shutdown command received. Exiting run loop.");
                        command_handler::handle_exit(player).await;
                        break;
                    }
                }
            }

            _ = remote_checkpoint_interval.tick(), if player.is_remote_playing() => {
                trace!(target: PLAYER_LOG_TARGET, "Remote checkpoint interval ticked.");
                command_handler::checkpoint_now(player);
            }

            else => {
                info!(target: PLAYER_LOG_TARGET, "Command channel closed. Exiting run loop.");
                break;
            }
        }
    }

    info!(target: PLAYER_LOG_TARGET, "Player run loop finished. Performing final cleanup.");
    player.countdown.take();
    if let Some(worker) = player.subtitles.take() {
        worker.abort();
    }
    info!(target: PLAYER_LOG_TARGET, "Player task cleanup complete.");
}

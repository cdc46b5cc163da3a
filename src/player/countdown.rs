use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::player::{PlayerCommand, PLAYER_LOG_TARGET};

/// Owns the auto-play countdown task. Dropping it cancels the countdown.
#[derive(Debug)]
pub struct CountdownTask {
    id: u64,
    next_media_id: String,
    remaining: u32,
    handle: JoinHandle<()>,
}

impl CountdownTask {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn next_media_id(&self) -> &str {
        &self.next_media_id
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn set_remaining(&mut self, remaining: u32) {
        self.remaining = remaining;
    }

    pub fn cancel(self) {
        debug!(target: PLAYER_LOG_TARGET, countdown_id = self.id, "Cancelling auto-play countdown");
        // Drop aborts.
    }
}

impl Drop for CountdownTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a countdown of `ticks` steps of `tick` each. Every step but the
/// last reports `CountdownTick`; the last reports `CountdownElapsed`.
pub fn spawn_countdown(
    id: u64,
    next_media_id: String,
    ticks: u32,
    tick: Duration,
    internal_cmd_tx: mpsc::Sender<PlayerCommand>,
) -> CountdownTask {
    info!(target: PLAYER_LOG_TARGET, countdown_id = id, "Starting {}-tick countdown to {}", ticks, next_media_id);
    let handle = tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + tick, tick);
        for remaining in (0..ticks).rev() {
            interval.tick().await;
            let command = if remaining == 0 {
                PlayerCommand::CountdownElapsed { countdown_id: id }
            } else {
                PlayerCommand::CountdownTick { countdown_id: id, remaining }
            };
            trace!(target: PLAYER_LOG_TARGET, countdown_id = id, remaining, "Countdown tick");
            if internal_cmd_tx.send(command).await.is_err() {
                warn!(target: PLAYER_LOG_TARGET, countdown_id = id, "Player gone, stopping countdown");
                return;
            }
        }
    });

    CountdownTask {
        id,
        next_media_id,
        remaining: ticks,
        handle,
    }
}

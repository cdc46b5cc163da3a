use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::player::state::{PlayerUpdate, Surface};
use crate::player::PLAYER_LOG_TARGET;
use crate::subtitle::SubtitleOffsetApplier;

const STOP_WAIT: Duration = Duration::from_secs(2);

/// Applies local subtitle offsets one at a time, in the order they were asked for.
/// A pass is never cut short between switching a track off and back on.
pub struct SubtitleWorker {
    offsets: mpsc::UnboundedSender<f64>,
    handle: JoinHandle<()>,
}

impl SubtitleWorker {
    pub fn spawn(applier: SubtitleOffsetApplier, updates: broadcast::Sender<PlayerUpdate>) -> Self {
        let (offsets, mut offset_rx) = mpsc::unbounded_channel::<f64>();
        let handle = tokio::spawn(async move {
            let mut applier = applier;
            while let Some(offset_seconds) = offset_rx.recv().await {
                match applier.apply_offset(offset_seconds).await {
                    Ok(report) => {
                        if !report.failed.is_empty() {
                            warn!(target: PLAYER_LOG_TARGET, "Subtitle tracks {:?} could not be shifted", report.failed);
                        }
                        let _ = updates.send(PlayerUpdate::SubtitleOffsetApplied {
                            surface: Surface::Local,
                            offset_seconds,
                        });
                    }
                    Err(e) => error!(target: PLAYER_LOG_TARGET, "Subtitle offset failed: {}", e),
                }
            }
            applier.clear();
        });
        SubtitleWorker { offsets, handle }
    }

    /// Queues an offset. False once the worker has gone away.
    pub fn submit(&self, offset_seconds: f64) -> bool {
        self.offsets.send(offset_seconds).is_ok()
    }

    /// Lets queued passes finish, then drops the cache and releases generated content.
    /// A worker stuck on a fetch is aborted after a short wait.
    pub async fn stop(self) {
        let SubtitleWorker { offsets, mut handle } = self;
        drop(offsets);
        if tokio::time::timeout(STOP_WAIT, &mut handle).await.is_err() {
            debug!(target: PLAYER_LOG_TARGET, "Subtitle worker still busy after {:?}, aborting", STOP_WAIT);
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

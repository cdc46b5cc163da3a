//! The in-process playback surface.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::subtitle::TrackHost;

const SURFACE_LOG_TARGET: &str = "r_moviecast::player::surface";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Failed to load media locally: {0}")]
    Load(String),
}

/// Notifications a local surface reports back about what it is rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalEvent {
    Progress { position: f64, duration: Option<f64> },
    DurationChanged(f64),
    Paused(bool),
    Ended,
}

pub type SurfaceEventSink = Arc<dyn Fn(LocalEvent) + Send + Sync>;

#[async_trait]
pub trait LocalSurface: Send + Sync {
    /// Start rendering `url` from `start_seconds`. Events for this load go to `events`
    /// until the next `load` or `stop`.
    async fn load(&self, url: &str, start_seconds: f64, events: SurfaceEventSink) -> Result<(), SurfaceError>;
    async fn pause(&self);
    async fn resume(&self);
    async fn seek(&self, seconds: f64);
    async fn stop(&self);

    /// Text tracks of the surface, when it can render subtitles.
    fn track_host(&self) -> Option<Arc<dyn TrackHost>> {
        None
    }
}

#[derive(Default)]
struct HeadlessClock {
    position: f64,
    paused: bool,
}

/// A surface that renders nothing and advances a clock in real time.
pub struct HeadlessSurface {
    tick: Duration,
    duration: Option<f64>,
    clock: Arc<Mutex<HeadlessClock>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeadlessSurface {
    /// A zero `tick` is raised to one millisecond.
    pub fn new(tick: Duration, duration: Option<f64>) -> Self {
        HeadlessSurface {
            tick: tick.max(Duration::from_millis(1)),
            duration,
            clock: Arc::new(Mutex::new(HeadlessClock::default())),
            task: Mutex::new(None),
        }
    }

    fn replace_task(&self, task: Option<JoinHandle<()>>) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(previous) = guard.take() {
                previous.abort();
            }
            *guard = task;
        }
    }

    fn with_clock(&self, f: impl FnOnce(&mut HeadlessClock)) {
        if let Ok(mut clock) = self.clock.lock() {
            f(&mut clock);
        }
    }
}

#[async_trait]
impl LocalSurface for HeadlessSurface {
    async fn load(&self, url: &str, start_seconds: f64, events: SurfaceEventSink) -> Result<(), SurfaceError> {
        info!(target: SURFACE_LOG_TARGET, "Headless playback of {} from {:.1}s", url, start_seconds);
        self.with_clock(|c| {
            c.position = start_seconds.max(0.0);
            c.paused = false;
        });

        if let Some(duration) = self.duration {
            events(LocalEvent::DurationChanged(duration));
        }

        let clock = self.clock.clone();
        let tick = self.tick;
        let duration = self.duration;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
            loop {
                interval.tick().await;
                let position = {
                    let Ok(mut c) = clock.lock() else { return };
                    if c.paused {
                        continue;
                    }
                    c.position += tick.as_secs_f64();
                    if let Some(d) = duration {
                        c.position = c.position.min(d);
                    }
                    c.position
                };
                events(LocalEvent::Progress { position, duration });
                if duration.is_some_and(|d| position >= d) {
                    events(LocalEvent::Ended);
                    return;
                }
            }
        });
        self.replace_task(Some(handle));
        Ok(())
    }

    async fn pause(&self) {
        debug!(target: SURFACE_LOG_TARGET, "Pause");
        self.with_clock(|c| c.paused = true);
    }

    async fn resume(&self) {
        debug!(target: SURFACE_LOG_TARGET, "Resume");
        self.with_clock(|c| c.paused = false);
    }

    async fn seek(&self, seconds: f64) {
        debug!(target: SURFACE_LOG_TARGET, "Seek to {:.1}s", seconds);
        self.with_clock(|c| c.position = seconds.max(0.0));
    }

    async fn stop(&self) {
        debug!(target: SURFACE_LOG_TARGET, "Stop");
        self.replace_task(None);
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        self.replace_task(None);
    }
}

//! End-to-end playback scenarios against fake surfaces and a fake media server.

use crate::test_utils::*;
use r_moviecast::cast::{CastSessionEvent, RemotePlayerEvent, SessionState};
use r_moviecast::player::{
    LocalEvent, PlaybackPhase, Player, PlayerCommand, PlayerConfig, PlayerStateSnapshot, PlayerUpdate,
    ResumeChoice, Surface,
};
use r_moviecast::progress::{LocalStore, WatchProgress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

struct Harness {
    api: Arc<FakeMediaApi>,
    surface: Arc<FakeSurface>,
    transport: Arc<FakeTransport>,
    store: Arc<LocalStore>,
    log: EventLog,
    commands: mpsc::Sender<PlayerCommand>,
    updates: broadcast::Receiver<PlayerUpdate>,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(api: FakeMediaApi) -> Self {
        Self::start_with(api, Arc::new(LocalStore::in_memory()), PlayerConfig::default())
    }

    fn start_with(api: FakeMediaApi, store: Arc<LocalStore>, config: PlayerConfig) -> Self {
        Self::launch(api, store, config, None)
    }

    fn start_with_tracks(api: FakeMediaApi, tracks: Arc<FakeTrackHost>) -> Self {
        Self::launch(api, Arc::new(LocalStore::in_memory()), PlayerConfig::default(), Some(tracks))
    }

    fn launch(
        api: FakeMediaApi,
        store: Arc<LocalStore>,
        config: PlayerConfig,
        tracks: Option<Arc<FakeTrackHost>>,
    ) -> Self {
        let log = event_log();
        let api = Arc::new(api);
        let surface = Arc::new(match tracks {
            Some(tracks) => FakeSurface::with_tracks(log.clone(), tracks),
            None => FakeSurface::new(log.clone()),
        });
        let transport = Arc::new(FakeTransport::new(log.clone()));
        let (mut player, commands) = Player::new(
            api.clone(),
            surface.clone(),
            transport.clone(),
            store.clone(),
            config,
        );
        let updates = player.subscribe_state_updates();
        let task = tokio::spawn(async move { player.run().await });
        Harness {
            api,
            surface,
            transport,
            store,
            log,
            commands,
            updates,
            task,
        }
    }

    async fn send(&self, command: PlayerCommand) {
        self.commands.send(command).await.unwrap();
    }

    /// Round-trips through the command queue, so everything sent before has been handled.
    async fn state(&self) -> PlayerStateSnapshot {
        let (tx, rx) = oneshot::channel();
        self.send(PlayerCommand::GetState(tx)).await;
        rx.await.unwrap()
    }

    async fn select(&self, media_id: &str) -> PlayerStateSnapshot {
        self.send(PlayerCommand::Select {
            media_id: media_id.to_string(),
        })
        .await;
        self.state().await
    }

    async fn cast_event(&self, session_id: &str, state: SessionState) -> PlayerStateSnapshot {
        self.send(PlayerCommand::CastSession(CastSessionEvent::new(session_id, state)))
            .await;
        self.state().await
    }

    fn drain_updates(&mut self) -> Vec<PlayerUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            out.push(update);
        }
        out
    }

    async fn wait_for_checkpoints(&self, count: usize) -> Vec<u64> {
        let api = self.api.clone();
        assert!(
            wait_for(|| api.position_updates().len() >= count).await,
            "expected {} checkpoints, got {:?}",
            count,
            self.api.position_updates()
        );
        self.api.checkpoint_positions()
    }

    /// Offsets of the next `count` local subtitle passes to finish.
    async fn local_subtitle_offsets(&mut self, count: usize) -> Vec<f64> {
        let mut seen = Vec::new();
        while seen.len() < count {
            match tokio::time::timeout(Duration::from_secs(2), self.updates.recv()).await {
                Ok(Ok(PlayerUpdate::SubtitleOffsetApplied {
                    surface: Surface::Local,
                    offset_seconds,
                })) => seen.push(offset_seconds),
                Ok(Ok(_)) => {}
                other => panic!("waiting for subtitle passes, got {:?} after {:?}", other, seen),
            }
        }
        seen
    }

    async fn shutdown(self) {
        self.send(PlayerCommand::Shutdown).await;
        self.task.await.unwrap();
    }
}

/// Starts `m1` locally from the beginning and reports `position`.
async fn playing_locally_at(harness: &Harness, position: f64) {
    let state = harness.select("m1").await;
    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    harness.surface.progress(position);
    harness.state().await;
}

#[tokio::test]
async fn test_resume_prompt_and_first_checkpoint_after_resume_point() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 734.0, Some(5400.0))));

    let state = harness.select("m1").await;
    assert_eq!(state.phase, PlaybackPhase::ResumePrompt);
    assert!(harness.surface.loads().is_empty());
    assert!(harness.drain_updates().contains(&PlayerUpdate::ResumePrompt {
        media_id: "m1".to_string(),
        resume_position: 734.0,
        duration: Some(5400.0),
    }));

    harness.send(PlayerCommand::ResumeChoice(ResumeChoice::Resume)).await;
    let state = harness.state().await;
    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    let session = state.session.unwrap();
    assert_eq!(session.start_offset, 734.0);
    assert_eq!(session.surface, Surface::Local);
    assert_eq!(
        harness.surface.loads(),
        vec![(format!("{}/stream/m1.mp4?sig=s#t=734", SERVER), 734.0)]
    );

    harness.surface.emit(LocalEvent::Progress {
        position: 740.0,
        duration: Some(5400.0),
    });
    let positions = harness.wait_for_checkpoints(1).await;
    assert!(positions[0] > 734, "first checkpoint at {}", positions[0]);
    assert_eq!(
        harness.api.position_updates()[0],
        format!("{}/signed/m1/position/740?sig=p&duration=5400", SERVER)
    );
    assert_eq!(harness.store.watch_progress("m1").map(|p| p.position), Some(740));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_start_over_plays_from_zero() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 734.0, Some(5400.0))));

    harness.select("m1").await;
    harness.send(PlayerCommand::ResumeChoice(ResumeChoice::StartOver)).await;
    let state = harness.state().await;

    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert_eq!(
        harness.surface.loads(),
        vec![(format!("{}/stream/m1.mp4?sig=s", SERVER), 0.0)]
    );
    harness.shutdown().await;
}

#[tokio::test]
async fn test_no_prior_position_skips_prompt() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));

    let state = harness.select("m1").await;
    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert!(!harness
        .drain_updates()
        .iter()
        .any(|u| matches!(u, PlayerUpdate::ResumePrompt { .. })));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_metadata_failure_falls_back_to_local_progress() {
    let store = Arc::new(LocalStore::in_memory());
    let harness = Harness::start_with(
        FakeMediaApi::new().with_urls_only("m1").with_urls_only("m2"),
        store.clone(),
        PlayerConfig::default(),
    );

    // Nothing cached: no prompt at all.
    let state = harness.select("m2").await;
    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert_eq!(state.target.unwrap().title, "m2");

    store.set_watch_progress("m1", WatchProgress::new(300, Some(1200))).unwrap();
    let state = harness.select("m1").await;
    assert_eq!(state.phase, PlaybackPhase::ResumePrompt);
    let target = state.target.unwrap();
    assert_eq!(target.resume_position, 300.0);
    assert_eq!(target.duration, Some(1200.0));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_signed_url_failure_returns_to_idle() {
    let mut harness = Harness::start(FakeMediaApi::new());

    let state = harness.select("missing").await;
    assert_eq!(state.phase, PlaybackPhase::Idle);
    assert!(state.target.is_none());
    assert!(harness
        .drain_updates()
        .iter()
        .any(|u| matches!(u, PlayerUpdate::LoadFailed { media_id, .. } if media_id == "missing")));
    assert!(harness.surface.loads().is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn test_progress_checkpoints_are_throttled() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 10.0).await;
    harness.surface.progress(11.0);
    harness.surface.progress(12.0);
    let state = harness.state().await;

    assert_eq!(state.session.unwrap().position, 12.0);
    assert_eq!(harness.wait_for_checkpoints(1).await, vec![10]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.api.position_updates().len(), 1);
    harness.shutdown().await;
}

#[tokio::test]
async fn test_zero_position_is_never_checkpointed() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 0.0).await;
    harness.send(PlayerCommand::Exit).await;
    harness.state().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.api.position_updates().is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn test_cast_takeover_pauses_local_before_remote_load() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, Some(5400.0))));
    playing_locally_at(&harness, 120.0).await;

    let session = harness.transport.start_session("s1", "Living Room TV");
    let state = harness.cast_event("s1", SessionState::Started).await;

    assert_eq!(state.phase, PlaybackPhase::PlayingRemote);
    assert!(state.remote.is_casting());
    assert_eq!(state.remote.device_name.as_deref(), Some("Living Room TV"));

    let pause = position_of(&harness.log, "local.pause").expect("local surface paused");
    let load = position_of(&harness.log, "remote.load").expect("remote load issued");
    assert!(pause < load, "log: {:?}", entries(&harness.log));

    let loads = session.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].current_time, 120.0);
    assert_eq!(loads[0].media.content_id, format!("{}/stream/m1.mp4?sig=s", SERVER));
    assert_eq!(loads[0].media.metadata.media_id, "m1");
    assert_eq!(
        loads[0].media.metadata.update_position_url.as_deref(),
        Some(format!("{}/signed/m1/position?sig=p", SERVER).as_str())
    );
    assert_eq!(loads[0].media.tracks[0].track_content_id, format!("{}/subs/m1.vtt", SERVER));

    let updates = harness.drain_updates();
    assert!(updates.contains(&PlayerUpdate::CastConnected {
        device_name: Some("Living Room TV".to_string())
    }));
    assert!(updates.contains(&PlayerUpdate::SessionStarted {
        media_id: "m1".to_string(),
        surface: Surface::Remote,
        start_offset: 120.0,
    }));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_only_the_active_surface_checkpoints() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, Some(5400.0))));
    playing_locally_at(&harness, 120.0).await;
    harness.wait_for_checkpoints(1).await;

    harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;

    // A late local report must not compete with the remote surface.
    harness.surface.progress(130.0);
    harness.transport.player("s1").emit(RemotePlayerEvent::CurrentTimeChanged(125.0));
    let state = harness.state().await;
    assert_eq!(state.session.unwrap().position, 125.0);

    let mut positions = harness.wait_for_checkpoints(2).await;
    positions.sort();
    assert_eq!(positions, vec![120, 125]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.api.checkpoint_positions().contains(&130));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_select_while_connected_plays_remotely() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    let session = harness.transport.start_session("s1", "TV");
    let state = harness.cast_event("s1", SessionState::Started).await;
    assert_eq!(state.phase, PlaybackPhase::Idle);

    let state = harness.select("m1").await;
    assert_eq!(state.phase, PlaybackPhase::PlayingRemote);
    assert!(harness.surface.loads().is_empty());
    assert_eq!(session.loads()[0].current_time, 0.0);
    harness.shutdown().await;
}

#[tokio::test]
async fn test_failed_remote_load_keeps_local_playback() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 60.0).await;

    let session = harness.transport.start_session("s1", "TV");
    session.fail_next_load(r_moviecast::cast::CastError::LoadFailed("TIMEOUT".into()));
    let state = harness.cast_event("s1", SessionState::Started).await;

    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert_eq!(
        entries(&harness.log)[1..],
        ["local.pause", "remote.load failed", "local.resume"]
    );
    assert!(harness.drain_updates().contains(&PlayerUpdate::CastError(
        "Failed to load media on cast device: TIMEOUT (TV)".to_string()
    )));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_carries_remote_position_back_to_local() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 120.0).await;
    harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;

    let remote = harness.transport.player("s1");
    remote.emit(RemotePlayerEvent::CurrentTimeChanged(290.0));
    remote.set_time(300.0);
    harness.transport.clear_session();
    let state = harness.cast_event("s1", SessionState::Ended).await;

    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert!(!state.remote.is_casting());
    assert_eq!(remote.listener_count(), 0);
    assert_eq!(harness.surface.loads().last().map(|l| l.1), Some(300.0));
    assert_eq!(state.session.unwrap().start_offset, 300.0);
    harness.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_without_carry_over_resumes_at_handover_point() {
    let config = PlayerConfig {
        carry_remote_position: false,
        ..PlayerConfig::default()
    };
    let harness = Harness::start_with(
        FakeMediaApi::new().with_media(movie("m1", 0.0, None)),
        Arc::new(LocalStore::in_memory()),
        config,
    );
    playing_locally_at(&harness, 120.0).await;
    harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;
    harness.transport.player("s1").set_time(300.0);

    harness.send(PlayerCommand::StopCasting).await;
    let state = harness.state().await;

    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert_eq!(harness.surface.loads().last().map(|l| l.1), Some(120.0));
    assert_eq!(harness.transport.end_calls(), 1);

    // Second stop is a no-op.
    harness.send(PlayerCommand::StopCasting).await;
    harness.state().await;
    assert_eq!(harness.transport.end_calls(), 1);
    harness.shutdown().await;
}

#[tokio::test]
async fn test_remote_media_finished_ends_playback() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 10.0).await;
    harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;

    harness.transport.player("s1").emit(RemotePlayerEvent::MediaFinished);
    let state = harness.state().await;

    assert_eq!(state.phase, PlaybackPhase::Ended);
    assert!(state.countdown.is_none());
    assert!(harness.drain_updates().contains(&PlayerUpdate::Ended {
        media_id: "m1".to_string(),
        next_media_id: None,
    }));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_stale_session_end_keeps_new_session() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 10.0).await;

    harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;
    let first = harness.transport.player("s1");
    harness.transport.start_session("s2", "TV");
    harness.cast_event("s2", SessionState::Started).await;
    let second = harness.transport.player("s2");

    let state = harness.cast_event("s1", SessionState::Ended).await;
    assert_eq!(state.phase, PlaybackPhase::PlayingRemote);
    assert_eq!(state.remote.session_id.as_deref(), Some("s2"));
    assert_eq!(first.listener_count(), 0);
    assert_eq!(second.listener_count(), 4);

    second.emit(RemotePlayerEvent::CurrentTimeChanged(42.0));
    assert_eq!(harness.state().await.session.unwrap().position, 42.0);
    harness.shutdown().await;
}

fn series_api() -> FakeMediaApi {
    let parent = "/shows/s1";
    FakeMediaApi::new()
        .with_media(episode("e1", parent))
        .with_media(episode("e2", parent))
        .with_children(parent, vec![episode("e1", parent), episode("e2", parent)])
}

async fn finish_episode(harness: &Harness) -> PlayerStateSnapshot {
    let state = harness.select("e1").await;
    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    harness.surface.progress(1499.0);
    harness.surface.emit(LocalEvent::Ended);
    harness.state().await
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_countdown_never_navigates() {
    let mut harness = Harness::start(series_api());

    let state = finish_episode(&harness).await;
    assert_eq!(state.phase, PlaybackPhase::Ended);
    let countdown = state.countdown.expect("countdown running");
    assert_eq!(countdown.next_media_id, "e2");
    assert_eq!(countdown.remaining, 10);
    assert_eq!(harness.api.list_requests()[0].path, "/shows/s1");

    harness.send(PlayerCommand::CancelAutoPlay).await;
    let state = harness.state().await;
    assert_eq!(state.phase, PlaybackPhase::Ended);
    assert!(state.countdown.is_none());

    tokio::time::sleep(Duration::from_secs(30)).await;
    let state = harness.state().await;
    assert_eq!(state.phase, PlaybackPhase::Ended);
    assert!(!harness.api.media_requests().contains(&"e2".to_string()));
    assert!(harness.drain_updates().contains(&PlayerUpdate::CountdownCancelled));
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_countdown_expiry_plays_next_episode() {
    let mut harness = Harness::start(series_api());
    finish_episode(&harness).await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    let state = harness.state().await;

    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert_eq!(state.target.unwrap().media_id, "e2");
    assert!(harness.api.media_requests().contains(&"e2".to_string()));

    let ticks: Vec<u32> = harness
        .drain_updates()
        .into_iter()
        .filter_map(|u| match u {
            PlayerUpdate::Countdown { remaining, .. } => Some(remaining),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, (1..=10).rev().collect::<Vec<_>>());
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_preference_off_means_no_countdown() {
    let harness = Harness::start(series_api());
    harness.send(PlayerCommand::SetAutoPlay(false)).await;

    let state = finish_episode(&harness).await;
    assert_eq!(state.phase, PlaybackPhase::Ended);
    assert!(state.countdown.is_none());
    assert!(!harness.store.autoplay_next());
    assert!(harness.api.list_requests().is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn test_last_episode_has_no_next() {
    let parent = "/shows/s1";
    let api = FakeMediaApi::new()
        .with_media(episode("e2", parent))
        .with_children(parent, vec![episode("e1", parent), episode("e2", parent)]);
    let harness = Harness::start(api);

    harness.select("e2").await;
    harness.surface.emit(LocalEvent::Ended);
    let state = harness.state().await;
    assert_eq!(state.phase, PlaybackPhase::Ended);
    assert!(state.countdown.is_none());
    harness.shutdown().await;
}

#[tokio::test]
async fn test_exit_saves_final_position_and_stops_surface() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 10.0).await;
    harness.wait_for_checkpoints(1).await;
    harness.surface.progress(12.0);

    harness.send(PlayerCommand::Exit).await;
    let state = harness.state().await;

    assert_eq!(state.phase, PlaybackPhase::Idle);
    assert!(state.session.is_none());
    assert_eq!(harness.api.checkpoint_positions(), vec![10, 12]);
    assert_eq!(entries(&harness.log).last().map(String::as_str), Some("local.stop"));
    assert!(harness.drain_updates().contains(&PlayerUpdate::Stopped));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_seek_and_toggle_route_to_the_active_surface() {
    let harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 10.0).await;

    harness.send(PlayerCommand::Seek(600.0)).await;
    harness.send(PlayerCommand::PlayPauseToggle).await;
    let state = harness.state().await;
    assert_eq!(state.session.as_ref().unwrap().position, 600.0);
    assert!(state.session.unwrap().paused);

    harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;
    harness.send(PlayerCommand::Seek(900.0)).await;
    harness.send(PlayerCommand::PlayPauseToggle).await;
    harness.state().await;

    let log = entries(&harness.log);
    assert!(log.contains(&"local.seek 600".to_string()));
    assert!(log.contains(&"remote.seek 900".to_string()));
    assert!(log.contains(&"remote.play".to_string()));
    harness.shutdown().await;
}

#[tokio::test]
async fn test_subtitle_offset_goes_to_receiver_when_casting() {
    let mut harness = Harness::start(FakeMediaApi::new().with_media(movie("m1", 0.0, None)));
    playing_locally_at(&harness, 10.0).await;
    let session = harness.transport.start_session("s1", "TV");
    harness.cast_event("s1", SessionState::Started).await;

    harness.send(PlayerCommand::SetSubtitleOffset(-1.5)).await;
    let state = harness.state().await;

    assert_eq!(state.subtitle_offset, -1.5);
    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "urn:x-cast:com.localmovie.cast");
    assert_eq!(
        messages[0].1,
        serde_json::json!({ "type": "SET_SUBTITLE_OFFSET", "offsetSeconds": -1.5 })
    );
    assert!(harness.drain_updates().contains(&PlayerUpdate::SubtitleOffsetApplied {
        surface: Surface::Remote,
        offset_seconds: -1.5,
    }));
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_next_episode_found_on_later_page() {
    let parent = "/shows/long";
    let episodes: Vec<_> = (1..=150).map(|n| episode(&format!("e{}", n), parent)).collect();
    let api = FakeMediaApi::new()
        .with_media(episode("e100", parent))
        .with_children(parent, episodes);
    let harness = Harness::start(api);

    harness.select("e100").await;
    harness.surface.emit(LocalEvent::Ended);
    let state = harness.state().await;

    assert_eq!(state.countdown.expect("countdown running").next_media_id, "e101");
    let pages: Vec<u32> = harness.api.list_requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, vec![0, 1]);
    assert!(harness.api.list_requests().iter().all(|r| r.page_size == 100));
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_listing_stops_at_short_page() {
    let parent = "/shows/long";
    let episodes: Vec<_> = (1..=150).map(|n| episode(&format!("e{}", n), parent)).collect();
    let api = FakeMediaApi::new()
        .with_media(episode("e150", parent))
        .with_children(parent, episodes);
    let harness = Harness::start(api);

    harness.select("e150").await;
    harness.surface.emit(LocalEvent::Ended);
    let state = harness.state().await;

    assert_eq!(state.phase, PlaybackPhase::Ended);
    assert!(state.countdown.is_none());
    assert_eq!(harness.api.list_requests().len(), 2);
    harness.shutdown().await;
}

const SUBTITLES: &str = "WEBVTT\n\n00:00:10.000 --> 00:00:12.000\nHello\n";

fn subtitled_api(ids: &[&str]) -> FakeMediaApi {
    ids.iter().fold(FakeMediaApi::new(), |api, id| {
        api.with_media(movie(id, 0.0, None))
            .with_subtitle(&format!("{}/subs/{}.vtt", SERVER, id), SUBTITLES)
    })
}

#[tokio::test]
async fn test_back_to_back_subtitle_offsets_leave_track_shown() {
    let tracks = Arc::new(FakeTrackHost::single_active_track());
    let mut harness = Harness::start_with_tracks(subtitled_api(&["m1"]), tracks.clone());
    assert_eq!(harness.select("m1").await.phase, PlaybackPhase::PlayingLocal);

    harness.send(PlayerCommand::SetSubtitleOffset(1.0)).await;
    // Second offset lands while the first pass has the track switched off.
    tokio::time::sleep(Duration::from_millis(40)).await;
    harness.send(PlayerCommand::SetSubtitleOffset(2.0)).await;
    assert_eq!(harness.state().await.subtitle_offset, 2.0);

    assert_eq!(harness.local_subtitle_offsets(2).await, vec![1.0, 2.0]);
    assert_eq!(tracks.active(), vec![1]);
    assert_eq!(
        tracks.events(),
        vec![
            "set 1 blob:1",
            "active []",
            "active [1]",
            "set 1 blob:2",
            "active []",
            "active [1]",
            "release blob:1",
        ]
    );
    assert!(tracks.shown_text(1).unwrap().contains("00:00:12.000 --> 00:00:14.000"));
    assert_eq!(harness.api.subtitle_fetches().len(), 1);
    harness.shutdown().await;
}

#[tokio::test]
async fn test_media_change_releases_generated_subtitles() {
    let tracks = Arc::new(FakeTrackHost::single_active_track());
    let mut harness = Harness::start_with_tracks(subtitled_api(&["m1", "m2"]), tracks.clone());
    let m1_subs = format!("{}/subs/m1.vtt", SERVER);

    harness.select("m1").await;
    harness.send(PlayerCommand::SetSubtitleOffset(1.5)).await;
    assert_eq!(harness.local_subtitle_offsets(1).await, vec![1.5]);
    assert_eq!(tracks.live_uris(), vec!["blob:1".to_string()]);

    let state = harness.select("m2").await;
    assert_eq!(state.subtitle_offset, 0.0);
    assert!(tracks.live_uris().is_empty());
    assert_eq!(tracks.content_id(1), Some(format!("{}/subs/m2.vtt", SERVER)));

    harness.select("m1").await;
    harness.send(PlayerCommand::SetSubtitleOffset(1.5)).await;
    assert_eq!(harness.local_subtitle_offsets(1).await, vec![1.5]);
    // Cache went with the old media, so the original is fetched again.
    assert_eq!(harness.api.subtitle_fetches(), vec![m1_subs.clone(), m1_subs]);
    assert!(tracks.shown_text(1).unwrap().contains("00:00:11.500 --> 00:00:13.500"));

    harness.send(PlayerCommand::Exit).await;
    harness.state().await;
    assert!(tracks.live_uris().is_empty());
    assert_eq!(tracks.registered_count(), 2);
    harness.shutdown().await;
}

#[tokio::test]
async fn test_subtitle_offset_follows_playback_across_surfaces() {
    let tracks = Arc::new(FakeTrackHost::single_active_track());
    let mut harness = Harness::start_with_tracks(subtitled_api(&["m1"]), tracks.clone());
    playing_locally_at(&harness, 120.0).await;
    harness.send(PlayerCommand::SetSubtitleOffset(2.0)).await;
    assert_eq!(harness.local_subtitle_offsets(1).await, vec![2.0]);

    let session = harness.transport.start_session("s1", "TV");
    let state = harness.cast_event("s1", SessionState::Started).await;
    assert_eq!(state.phase, PlaybackPhase::PlayingRemote);
    assert_eq!(
        session.messages(),
        vec![(
            "urn:x-cast:com.localmovie.cast".to_string(),
            serde_json::json!({ "type": "SET_SUBTITLE_OFFSET", "offsetSeconds": 2.0 })
        )]
    );

    harness.transport.player("s1").set_time(300.0);
    harness.transport.clear_session();
    let state = harness.cast_event("s1", SessionState::Ended).await;
    assert_eq!(state.phase, PlaybackPhase::PlayingLocal);
    assert_eq!(state.subtitle_offset, 2.0);

    // The reload put the original track back; the offset is shifted in again.
    assert_eq!(harness.local_subtitle_offsets(1).await, vec![2.0]);
    assert!(tracks.shown_text(1).unwrap().contains("00:00:12.000 --> 00:00:14.000"));
    assert_eq!(tracks.active(), vec![1]);
    assert_eq!(harness.api.subtitle_fetches().len(), 1);
    harness.shutdown().await;
}

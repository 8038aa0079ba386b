use super::*;
use crate::supervisor::mock::MockLauncher;
use pb_protocol::config_models::{DetectionConfig, KioskConfig};
use serde_json::json;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct RecordingIndicator {
    states: Mutex<Vec<bool>>,
}

impl RecordingIndicator {
    fn last(&self) -> Option<bool> {
        self.states.lock().unwrap().last().copied()
    }

    fn history(&self) -> Vec<bool> {
        self.states.lock().unwrap().clone()
    }
}

impl Indicator for RecordingIndicator {
    fn set_indicator(&self, on: bool) {
        self.states.lock().unwrap().push(on);
    }
}

struct Harness {
    dir: TempDir,
    orchestrator: Orchestrator<MockLauncher>,
    indicator: Arc<RecordingIndicator>,
}

fn test_config(root: &Path) -> KioskConfig {
    let mut config = KioskConfig::default();
    config.paths.data_dir = root.join("data");
    config.paths.cache_dir = root.join("cache");
    config.paths.snapshot_dir = root.join("snapshots");
    config.detection.restart_delay_ms = 0;
    crate::config::ensure_directories(&config).unwrap();
    config
}

async fn harness_with(launcher: MockLauncher) -> Harness {
    harness_configured(launcher, |_| {}).await
}

async fn harness_configured(
    launcher: MockLauncher,
    configure: impl FnOnce(&mut KioskConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);
    let indicator = Arc::new(RecordingIndicator::default());
    let mut orchestrator = Orchestrator::new(
        config,
        dir.path(),
        launcher,
        Arc::clone(&indicator) as Arc<dyn Indicator>,
    );
    orchestrator.start().await;
    Harness {
        dir,
        orchestrator,
        indicator,
    }
}

async fn harness() -> Harness {
    harness_with(MockLauncher::new()).await
}

impl Harness {
    fn active(&self) -> ActiveStage {
        self.orchestrator
            .active_stage()
            .expect("expected an active stage")
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn protocol(&self, payload: ProtocolPayload) -> Event {
        let active = self.active();
        Event::Protocol(ProtocolEvent {
            stage: active.stage,
            instance: active.instance,
            payload,
        })
    }

    async fn send(&mut self, event: Event) -> Flow {
        let flow = self.orchestrator.handle_event(event).await;
        assert!(
            self.orchestrator.launcher().live().len() <= 1,
            "more than one live stage"
        );
        flow
    }

    async fn send_protocol(&mut self, payload: ProtocolPayload) {
        let event = self.protocol(payload);
        self.send(event).await;
    }

    async fn exit_active(&mut self) {
        let active = self.active();
        let event = self
            .orchestrator
            .launcher_mut()
            .exit(active.instance, Some(0))
            .unwrap();
        self.send(event).await;
    }

    async fn to_user_input(&mut self) {
        self.send(Event::ManualOverride(OverrideCommand::Start)).await;
        assert_eq!(self.orchestrator.state(), KioskState::UserInput);
    }

    async fn to_detection(&mut self) {
        self.to_user_input().await;
        self.send_protocol(ProtocolPayload::UserData(
            json!({"STORY_ID": 1, "NAME_A": "Alice", "NAME_B": ""}),
        ))
        .await;
        assert_eq!(self.orchestrator.state(), KioskState::Detection);
    }

    async fn to_photo(&mut self) {
        self.to_detection().await;
        self.send(Event::HardwareButton).await;
        assert_eq!(self.orchestrator.state(), KioskState::Photo);
    }

    /// Leave a snapshot on disk and a photo artifact pointing at it.
    fn write_photo_artifact(&self) {
        let session_id = &self.orchestrator.session().session_id;
        fs::write(self.dir.path().join("snapshots/snapshot_20240512_143012.jpg"), b"jpg").unwrap();
        fs::write(
            self.data_dir().join(format!("photo_data_{session_id}.json")),
            json!({
                "image_path": "snapshots/snapshot_20240512_143012.jpg",
                "cache_img_path": "cache/cache_20240512_143009.jpg",
            })
            .to_string(),
        )
        .unwrap();
    }

    async fn to_review(&mut self) {
        self.to_photo().await;
        self.write_photo_artifact();
        self.exit_active().await;
        assert_eq!(self.orchestrator.state(), KioskState::Review);
    }

    fn saved_sessions(&self) -> Vec<Session> {
        self.orchestrator
            .store()
            .list_sessions()
            .into_iter()
            .map(|(_, session)| session)
            .collect()
    }

    fn temp_exists(&self) -> bool {
        let id = &self.orchestrator.session().session_id;
        self.orchestrator.store().temp_path(id).exists()
    }
}

#[tokio::test]
async fn test_start_launches_idle_stage() {
    let h = harness().await;
    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.launcher().spawned_stages(), vec![StageKind::Idle]);
    assert_eq!(h.indicator.last(), Some(false));
}

#[tokio::test]
async fn test_override_in_idle_starts_user_input() {
    let mut h = harness().await;
    let idle = h.active().instance;

    h.send(Event::ManualOverride(OverrideCommand::Start)).await;

    assert_eq!(h.orchestrator.state(), KioskState::UserInput);
    assert!(h.orchestrator.launcher().was_terminated(idle));
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::UserInput), 1);
    assert!(!h.orchestrator.session().session_id.is_empty());
}

#[tokio::test]
async fn test_motion_in_idle_starts_user_input() {
    let mut h = harness().await;
    h.send(Event::HardwareMotion).await;
    assert_eq!(h.orchestrator.state(), KioskState::UserInput);
}

#[tokio::test]
async fn test_user_data_moves_to_detection() {
    let mut h = harness().await;
    h.to_user_input().await;

    h.send_protocol(ProtocolPayload::UserData(
        json!({"STORY_ID": 1, "NAME_A": "Alice", "NAME_B": ""}),
    ))
    .await;

    let session = h.orchestrator.session();
    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert_eq!(session.story_id, Some(1));
    assert_eq!(session.users.names, vec!["Alice".to_string()]);
    assert!(h.temp_exists());

    let detection = h.orchestrator.launcher().last_spawned().unwrap();
    assert_eq!(detection.request.stage, StageKind::Detection);
    assert_eq!(detection.request.args, vec!["-i", "rpi"]);
    let args: serde_json::Value =
        serde_json::from_str(&detection.request.env[requests::DETECTION_ARGS_ENV]).unwrap();
    assert_eq!(args["json_id"], session.session_id.as_str());
}

#[tokio::test]
async fn test_non_object_user_data_has_no_names() {
    let mut h = harness().await;
    h.to_user_input().await;

    h.send_protocol(ProtocolPayload::UserData(json!(["Alice"]))).await;

    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert!(h.orchestrator.session().users.names.is_empty());
    assert_eq!(h.orchestrator.session().story_id, None);
}

#[tokio::test]
async fn test_user_input_exit_returns_to_idle() {
    let mut h = harness().await;
    h.to_user_input().await;

    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Idle), 2);
    assert!(h.saved_sessions().is_empty());
}

#[tokio::test]
async fn test_user_input_launch_failure_uses_default_data() {
    let mut h = harness_with(MockLauncher::new().failing(StageKind::UserInput)).await;

    h.send(Event::ManualOverride(OverrideCommand::Start)).await;

    let session = h.orchestrator.session();
    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert_eq!(session.story_id, Some(1));
    assert_eq!(
        session.users.names,
        vec!["User A".to_string(), "User B".to_string()]
    );
    assert!(h.temp_exists());
}

#[tokio::test]
async fn test_button_starts_photo() {
    let mut h = harness().await;
    h.to_detection().await;
    let detection = h.active().instance;

    h.send(Event::HardwareButton).await;

    assert_eq!(h.orchestrator.state(), KioskState::Photo);
    assert!(h.orchestrator.launcher().was_terminated(detection));
    assert_eq!(h.indicator.last(), Some(true));

    let photo = h.orchestrator.launcher().last_spawned().unwrap();
    assert_eq!(photo.request.stage, StageKind::Photo);
    assert!(photo.request.args.contains(&"--json-id".to_string()));
    assert!(photo
        .request
        .args
        .contains(&h.orchestrator.session().session_id));
}

#[tokio::test]
async fn test_capture_override_only_in_detection() {
    let mut h = harness().await;
    h.send(Event::ManualOverride(OverrideCommand::Capture)).await;
    h.send(Event::HardwareButton).await;
    assert_eq!(h.orchestrator.state(), KioskState::Idle);

    h.to_detection().await;
    h.send(Event::ManualOverride(OverrideCommand::Capture)).await;
    assert_eq!(h.orchestrator.state(), KioskState::Photo);
}

#[tokio::test]
async fn test_detection_exit_respawns_same_session() {
    let mut h = harness().await;
    h.to_detection().await;
    let session_id = h.orchestrator.session().session_id.clone();

    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Detection), 2);
    assert_eq!(h.orchestrator.session().session_id, session_id);
}

#[tokio::test(start_paused = true)]
async fn test_detection_respawns_until_visitor_captures() {
    let mut h = harness_configured(MockLauncher::new(), |config| {
        config.detection = DetectionConfig::default();
    })
    .await;
    h.to_detection().await;
    let session_id = h.orchestrator.session().session_id.clone();

    for _ in 0..60 {
        h.exit_active().await;
        assert_eq!(h.orchestrator.state(), KioskState::Detection);
    }

    assert_eq!(h.orchestrator.session().session_id, session_id);
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Detection), 61);
    assert!(h.saved_sessions().is_empty());

    h.send(Event::HardwareButton).await;
    assert_eq!(h.orchestrator.state(), KioskState::Photo);
}

#[tokio::test(start_paused = true)]
async fn test_detection_restart_waits_for_delay() {
    let mut h = harness_configured(MockLauncher::new(), |config| {
        config.detection.restart_delay_ms = 2_000;
    })
    .await;
    h.to_detection().await;

    let started = tokio::time::Instant::now();
    h.exit_active().await;

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Detection), 2);
}

#[tokio::test]
async fn test_detection_restart_budget() {
    let mut h = harness_configured(MockLauncher::new(), |config| {
        config.detection.max_restarts = Some(2);
    })
    .await;
    h.to_detection().await;

    h.exit_active().await;
    h.exit_active().await;
    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Detection), 3);
    assert_eq!(h.saved_sessions().len(), 1);
}

#[tokio::test]
async fn test_detection_launch_failure_ends_session() {
    let mut h = harness_with(MockLauncher::new().failing(StageKind::Detection)).await;
    h.to_user_input().await;

    h.send_protocol(ProtocolPayload::UserData(json!({"NAME_A": "Alice"})))
        .await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    let saved = h.saved_sessions();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].users.names, vec!["Alice".to_string()]);
}

#[tokio::test]
async fn test_detection_artifact_merged() {
    let mut h = harness().await;
    h.to_user_input().await;
    let session_id = h.orchestrator.session().session_id.clone();
    fs::write(
        h.data_dir()
            .join(format!("detection_data_{session_id}_20240512_143005.json")),
        json!({"story_id": 9, "users": {"names": ["Mallory"], "detected_props": ["hat", "hat", "wand"]}})
            .to_string(),
    )
    .unwrap();

    h.send_protocol(ProtocolPayload::UserData(
        json!({"STORY_ID": 3, "NAME_A": "Alice"}),
    ))
    .await;

    let session = h.orchestrator.session();
    assert_eq!(session.story_id, Some(3));
    assert_eq!(session.users.names, vec!["Alice".to_string()]);
    assert_eq!(
        session.users.detected_props,
        vec!["hat".to_string(), "wand".to_string()]
    );
}

#[tokio::test]
async fn test_photo_exit_with_artifact_moves_to_review() {
    let mut h = harness().await;
    h.to_photo().await;
    h.write_photo_artifact();

    h.exit_active().await;

    let session = h.orchestrator.session();
    assert_eq!(h.orchestrator.state(), KioskState::Review);
    assert_eq!(session.image_path, "snapshots/snapshot_20240512_143012.jpg");
    assert_eq!(session.cache_image_path, "cache/cache_20240512_143009.jpg");
    assert_eq!(h.indicator.last(), Some(false));

    let review = h.orchestrator.launcher().last_spawned().unwrap();
    assert_eq!(
        review.request.args,
        vec!["--image", "snapshots/snapshot_20240512_143012.jpg"]
    );
}

#[tokio::test]
async fn test_photo_exit_falls_back_to_latest_snapshot() {
    let mut h = harness().await;
    h.to_photo().await;
    fs::write(h.dir.path().join("snapshots/snapshot_20240101_000000.jpg"), b"").unwrap();
    fs::write(h.dir.path().join("snapshots/snapshot_20240101_000100.jpg"), b"").unwrap();

    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Review);
    assert_eq!(
        h.orchestrator.session().image_path,
        Path::new("snapshots")
            .join("snapshot_20240101_000100.jpg")
            .display()
            .to_string()
    );
}

#[tokio::test]
async fn test_photo_exit_without_snapshot_returns_to_detection() {
    let mut h = harness().await;
    h.to_photo().await;

    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert_eq!(h.indicator.last(), Some(false));
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Review), 0);
}

#[tokio::test]
async fn test_photo_launch_failure_returns_to_detection() {
    let mut h = harness_with(MockLauncher::new().failing(StageKind::Photo)).await;
    h.to_detection().await;

    h.send(Event::HardwareButton).await;

    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    let history = h.indicator.history();
    assert_eq!(&history[history.len() - 2..], &[true, false]);
}

#[tokio::test]
async fn test_path_update_during_photo() {
    let mut h = harness().await;
    h.to_photo().await;

    h.send_protocol(ProtocolPayload::PathUpdate {
        field: PathField::CacheImagePath,
        value: PathBuf::from("cache/cache_1.jpg"),
    })
    .await;

    assert_eq!(h.orchestrator.state(), KioskState::Photo);
    assert_eq!(h.orchestrator.session().cache_image_path, "cache/cache_1.jpg");

    let id = h.orchestrator.session().session_id.clone();
    let temp = h.orchestrator.store().read_temp(&id).unwrap();
    assert_eq!(temp.cache_image_path, "cache/cache_1.jpg");
}

#[tokio::test]
async fn test_path_update_outside_photo_ignored() {
    let mut h = harness().await;
    h.to_detection().await;

    h.send_protocol(ProtocolPayload::PathUpdate {
        field: PathField::ImagePath,
        value: PathBuf::from("snapshots/x.jpg"),
    })
    .await;

    assert!(h.orchestrator.session().image_path.is_empty());
}

#[tokio::test]
async fn test_review_continue_persists() {
    let mut h = harness().await;
    h.to_review().await;
    let review = h.active().instance;

    h.send_protocol(ProtocolPayload::Result(ReviewDecision::Continue))
        .await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert!(h.orchestrator.launcher().was_terminated(review));
    assert!(!h.temp_exists());

    let saved = h.saved_sessions();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].image_path, "snapshots/snapshot_20240512_143012.jpg");
    assert!(!saved[0].timestamp.is_empty());
}

#[tokio::test]
async fn test_review_try_again_returns_to_detection() {
    let mut h = harness().await;
    h.to_review().await;
    let review = h.active().instance;

    h.send_protocol(ProtocolPayload::Result(ReviewDecision::TryAgain))
        .await;

    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert!(h.orchestrator.launcher().was_terminated(review));
    assert!(h.saved_sessions().is_empty());
}

#[tokio::test]
async fn test_review_exit_without_result_persists() {
    let mut h = harness().await;
    h.to_review().await;

    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    let saved = h.saved_sessions();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].users.names, vec!["Alice".to_string()]);
    assert_eq!(saved[0].story_id, Some(1));
}

#[tokio::test]
async fn test_review_other_result_ignored() {
    let mut h = harness().await;
    h.to_review().await;

    h.send_protocol(ProtocolPayload::Result(ReviewDecision::Other(
        "print".to_string(),
    )))
    .await;

    assert_eq!(h.orchestrator.state(), KioskState::Review);
}

#[tokio::test]
async fn test_review_launch_failure_persists() {
    let mut h = harness_with(MockLauncher::new().failing(StageKind::Review)).await;
    h.to_photo().await;
    h.write_photo_artifact();

    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.saved_sessions().len(), 1);
}

#[tokio::test]
async fn test_stale_events_ignored() {
    let mut h = harness().await;
    h.to_review().await;
    let stale = h.active();

    h.send_protocol(ProtocolPayload::Result(ReviewDecision::TryAgain))
        .await;
    assert_eq!(h.orchestrator.state(), KioskState::Detection);

    // The terminated review instance still reports its exit and output.
    h.send(Event::Protocol(ProtocolEvent {
        stage: stale.stage,
        instance: stale.instance,
        payload: ProtocolPayload::Result(ReviewDecision::Continue),
    }))
    .await;
    h.send(Event::ProcessExited {
        stage: stale.stage,
        instance: stale.instance,
        exit_code: None,
    })
    .await;

    assert_eq!(h.orchestrator.state(), KioskState::Detection);
    assert!(h.saved_sessions().is_empty());
}

#[tokio::test]
async fn test_idle_stage_exit_stays_idle() {
    let mut h = harness().await;
    h.exit_active().await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.active_stage(), None);

    h.send(Event::HardwareMotion).await;
    assert_eq!(h.orchestrator.state(), KioskState::UserInput);
}

#[tokio::test]
async fn test_idle_launch_failure_stays_idle() {
    let h = harness_with(MockLauncher::new().failing(StageKind::Idle)).await;
    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.active_stage(), None);
}

#[tokio::test]
async fn test_new_visit_gets_new_session_id() {
    let mut h = harness().await;
    h.to_user_input().await;
    let first = h.orchestrator.session().session_id.clone();
    h.exit_active().await;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    h.to_user_input().await;
    assert_ne!(h.orchestrator.session().session_id, first);
}

#[tokio::test]
async fn test_shutdown_cleans_up() {
    let mut h = harness().await;
    h.to_photo().await;
    let photo = h.active().instance;
    assert!(h.temp_exists());

    let flow = h.send(Event::Shutdown).await;

    assert_eq!(flow, Flow::Stop);
    assert!(h.orchestrator.launcher().was_terminated(photo));
    assert!(h.orchestrator.launcher().live().is_empty());
    assert_eq!(h.indicator.last(), Some(false));
    assert!(!h.temp_exists());
}

#[tokio::test]
async fn test_unstoppable_stage_blocks_next_launch() {
    let mut h = harness_with(MockLauncher::new().stuck(StageKind::Detection)).await;
    h.to_detection().await;
    let detection = h.active().instance;

    h.send(Event::HardwareButton).await;

    // Photo and detection fallbacks both fail while detection runs on.
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Photo), 0);
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::Detection), 1);
    assert_eq!(h.orchestrator.launcher().max_live_at_spawn(), 1);
    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.active_stage(), None);
    assert_eq!(h.orchestrator.launcher().live(), &[detection]);
    assert_eq!(h.saved_sessions().len(), 1);
    assert_eq!(h.indicator.last(), Some(false));

    let exited = h
        .orchestrator
        .launcher_mut()
        .exit(detection, None)
        .unwrap();
    h.send(exited).await;
    assert!(h.orchestrator.lingering_stages().is_empty());

    h.to_user_input().await;
    assert_eq!(h.orchestrator.launcher().max_live_at_spawn(), 1);
}

#[tokio::test]
async fn test_lingering_stage_retried_on_next_launch() {
    let mut h = harness_with(MockLauncher::new().stuck(StageKind::Idle)).await;
    let idle = h.active().instance;

    h.send(Event::ManualOverride(OverrideCommand::Start)).await;
    assert_eq!(h.orchestrator.launcher().spawn_count(StageKind::UserInput), 0);
    assert_eq!(h.orchestrator.lingering_stages().len(), 1);

    // The stage gives in to the next attempt.
    h.orchestrator
        .launcher_mut()
        .set_stuck(StageKind::Idle, false);
    h.send(Event::ManualOverride(OverrideCommand::Start)).await;

    assert_eq!(h.orchestrator.state(), KioskState::UserInput);
    assert!(h.orchestrator.lingering_stages().is_empty());
    assert!(!h.orchestrator.launcher().live().contains(&idle));
}

#[tokio::test]
async fn test_full_visit_keeps_one_live_stage() {
    let mut h = harness().await;
    h.to_review().await;
    h.send_protocol(ProtocolPayload::Result(ReviewDecision::TryAgain))
        .await;
    h.send(Event::HardwareButton).await;
    h.write_photo_artifact();
    h.exit_active().await;
    h.send_protocol(ProtocolPayload::Result(ReviewDecision::Continue))
        .await;

    assert_eq!(h.orchestrator.state(), KioskState::Idle);
    assert_eq!(h.orchestrator.launcher().max_live_at_spawn(), 1);
    assert_eq!(h.saved_sessions().len(), 1);
}

/// Every event kind, aimed at the active stage where it carries an instance.
fn all_events(active: Option<ActiveStage>) -> Vec<Event> {
    let (stage, instance) = match active {
        Some(active) => (active.stage, active.instance),
        None => (StageKind::Idle, uuid::Uuid::new_v4()),
    };
    let protocol = |payload| {
        Event::Protocol(ProtocolEvent {
            stage,
            instance,
            payload,
        })
    };
    vec![
        Event::HardwareMotion,
        Event::HardwareButton,
        Event::ManualOverride(OverrideCommand::Start),
        Event::ManualOverride(OverrideCommand::Capture),
        protocol(ProtocolPayload::UserData(json!({"NAME_A": "Zed"}))),
        protocol(ProtocolPayload::Result(ReviewDecision::Continue)),
        protocol(ProtocolPayload::Result(ReviewDecision::TryAgain)),
        protocol(ProtocolPayload::Result(ReviewDecision::Other("x".to_string()))),
        protocol(ProtocolPayload::PathUpdate {
            field: PathField::ImagePath,
            value: PathBuf::from("snapshots/none.jpg"),
        }),
        Event::ProcessExited {
            stage,
            instance,
            exit_code: Some(1),
        },
        Event::Shutdown,
    ]
}

#[tokio::test]
async fn test_every_state_handles_every_event() {
    for target in [
        KioskState::Idle,
        KioskState::UserInput,
        KioskState::Detection,
        KioskState::Photo,
        KioskState::Review,
    ] {
        let count = all_events(None).len();
        for index in 0..count {
            let mut h = harness().await;
            match target {
                KioskState::Idle => {}
                KioskState::UserInput => h.to_user_input().await,
                KioskState::Detection => h.to_detection().await,
                KioskState::Photo => h.to_photo().await,
                KioskState::Review => h.to_review().await,
            }

            let event = all_events(h.orchestrator.active_stage()).swap_remove(index);
            let is_shutdown = event == Event::Shutdown;
            let flow = h.send(event).await;

            assert_eq!(flow == Flow::Stop, is_shutdown);
            if !is_shutdown {
                let state = h.orchestrator.state();
                // A live stage, when there is one, always belongs to the state.
                if let Some(active) = h.orchestrator.active_stage() {
                    assert_eq!(active.stage, state.stage(), "{target} -> {state}");
                } else {
                    assert_eq!(state, KioskState::Idle, "{target} left no stage outside Idle");
                }
            }
            assert_eq!(h.orchestrator.launcher().max_live_at_spawn(), 1);
        }
    }
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut orchestrator = Orchestrator::new(
        config,
        dir.path(),
        MockLauncher::new(),
        Arc::new(RecordingIndicator::default()) as Arc<dyn Indicator>,
    );

    let (tx, rx) = pb_protocol::event_queue();
    tx.send(Event::HardwareMotion).await.unwrap();
    tx.send(Event::Shutdown).await.unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), orchestrator.run(rx))
        .await
        .expect("run loop should stop");

    assert_eq!(orchestrator.state(), KioskState::UserInput);
    assert!(orchestrator.launcher().live().is_empty());
}

#[tokio::test]
async fn test_run_loop_stops_when_queue_closes() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut orchestrator = Orchestrator::new(
        config,
        dir.path(),
        MockLauncher::new(),
        Arc::new(RecordingIndicator::default()) as Arc<dyn Indicator>,
    );

    let (tx, rx) = pb_protocol::event_queue();
    drop(tx);

    tokio::time::timeout(std::time::Duration::from_secs(5), orchestrator.run(rx))
        .await
        .expect("run loop should stop");
    assert!(orchestrator.launcher().live().is_empty());
}

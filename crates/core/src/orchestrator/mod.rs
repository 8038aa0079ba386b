//! The kiosk state machine.
//!
//! The [`Orchestrator`] is the single consumer of the event queue and the
//! only owner of the kiosk state, the active stage and the session record.
//! Every transition terminates the outgoing stage before the next one is
//! launched, so at most one stage program is alive at any time. A stage
//! that survives termination is kept as lingering and blocks every launch
//! until it exits, which the states answer with their launch-failure
//! fallback.
//!
//! | State | Event | Next |
//! |---|---|---|
//! | Idle | motion, `s` | UserInput (fresh session) |
//! | UserInput | `DATA` | Detection |
//! | UserInput | exit | Idle |
//! | UserInput | launch failure | Detection (default user data) |
//! | Detection | button, `b` | Photo (indicator on) |
//! | Detection | exit | Detection (respawn after a delay) |
//! | Photo | exit | Review, or Detection without a snapshot |
//! | Photo | `PATH_UPDATE` | Photo (merged) |
//! | Review | `RESULT:continue` / exit / launch failure | Idle (persisted) |
//! | Review | `RESULT:try_again` | Detection |
//! | any | shutdown | stopped |
//!
//! Anything else is logged and ignored.

pub mod requests;

use crate::hardware::Indicator;
use crate::session::{SessionStore, DETECTION_ARTIFACT_PREFIX, PHOTO_ARTIFACT_PREFIX};
use crate::supervisor::{
    StageLauncher, StageRequest, SupervisorError, SupervisorResult, TerminationOutcome,
};
use pb_protocol::config_models::KioskConfig;
use pb_protocol::ipc::{Event, PathField, ProtocolEvent, ProtocolPayload, StageInstanceId};
use pb_protocol::session_models::{fallback_user_data, Session, SessionPatch};
use pb_protocol::stage_models::{KioskState, OverrideCommand, ReviewDecision, StageKind};
use pb_protocol::EventReceiver;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Whether the event loop keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// The stage program currently driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveStage {
    pub stage: StageKind,
    pub instance: StageInstanceId,
}

pub struct Orchestrator<L: StageLauncher> {
    config: KioskConfig,
    root: PathBuf,
    launcher: L,
    store: SessionStore,
    indicator: Arc<dyn Indicator>,
    state: KioskState,
    active: Option<ActiveStage>,
    lingering: Vec<ActiveStage>,
    session: Session,
    detection_restarts: u32,
}

impl<L: StageLauncher> Orchestrator<L> {
    /// `root` is the stage working directory; relative paths reported by
    /// stages are resolved against it.
    pub fn new(
        config: KioskConfig,
        root: impl Into<PathBuf>,
        launcher: L,
        indicator: Arc<dyn Indicator>,
    ) -> Self {
        let store = SessionStore::from_config(&config);
        Self {
            config,
            root: root.into(),
            launcher,
            store,
            indicator,
            state: KioskState::Idle,
            active: None,
            lingering: Vec::new(),
            session: Session::default(),
            detection_restarts: 0,
        }
    }

    pub fn state(&self) -> KioskState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn active_stage(&self) -> Option<ActiveStage> {
        self.active
    }

    /// Stages that survived termination and have not exited yet.
    pub fn lingering_stages(&self) -> &[ActiveStage] {
        &self.lingering
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut L {
        &mut self.launcher
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Enter Idle and process events until shutdown or until every
    /// producer has gone away.
    pub async fn run(&mut self, mut events: EventReceiver) {
        self.start().await;

        while let Some(event) = events.recv().await {
            if self.handle_event(event).await == Flow::Stop {
                return;
            }
        }

        debug!("Event queue closed");
        self.shutdown().await;
    }

    /// Launch the idle stage. Called once before the first event.
    pub async fn start(&mut self) {
        info!("Photobooth ready, waiting for visitors");
        self.enter_idle().await;
    }

    /// Apply one event.
    pub async fn handle_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Shutdown => {
                self.shutdown().await;
                return Flow::Stop;
            }
            Event::HardwareMotion | Event::ManualOverride(OverrideCommand::Start) => {
                if self.state == KioskState::Idle {
                    info!(trigger = ?event, "Visitor detected");
                    self.start_visit().await;
                } else {
                    debug!(state = %self.state, ?event, "Start trigger ignored");
                }
            }
            Event::HardwareButton | Event::ManualOverride(OverrideCommand::Capture) => {
                if self.state == KioskState::Detection {
                    info!(trigger = ?event, "Capture requested");
                    self.capture().await;
                } else {
                    debug!(state = %self.state, ?event, "Capture trigger ignored");
                }
            }
            Event::Protocol(event) => {
                if self.is_active(event.instance) {
                    self.handle_protocol(event).await;
                } else {
                    debug!(stage = %event.stage, kind = ?event.kind(), "Ignoring event from stale stage");
                }
            }
            Event::ProcessExited {
                stage,
                instance,
                exit_code,
            } => {
                if self.is_active(instance) {
                    self.active = None;
                    self.handle_exit(stage, exit_code).await;
                } else if let Some(index) = self
                    .lingering
                    .iter()
                    .position(|s| s.instance == instance)
                {
                    self.lingering.swap_remove(index);
                    info!(stage = %stage, "Lingering stage exited");
                } else {
                    debug!(stage = %stage, "Ignoring exit of stale stage");
                }
            }
        }
        Flow::Continue
    }

    fn is_active(&self, instance: StageInstanceId) -> bool {
        self.active.is_some_and(|active| active.instance == instance)
    }

    async fn handle_protocol(&mut self, event: ProtocolEvent) {
        match (self.state, event.payload) {
            (KioskState::UserInput, ProtocolPayload::UserData(payload)) => {
                info!(session_id = %self.session.session_id, "User data received");
                self.apply_user_data(&payload);
                self.enter_detection().await;
            }
            (KioskState::Photo, ProtocolPayload::PathUpdate { field, value }) => {
                self.apply_path_update(field, &value);
            }
            (KioskState::Review, ProtocolPayload::Result(decision)) => match decision {
                ReviewDecision::Continue => {
                    info!(session_id = %self.session.session_id, "Photo accepted");
                    self.persist_session();
                    self.enter_idle().await;
                }
                ReviewDecision::TryAgain => {
                    info!(session_id = %self.session.session_id, "Retaking photo");
                    self.enter_detection().await;
                }
                ReviewDecision::Other(token) => {
                    info!(token = %token, "Unknown review result ignored");
                }
            },
            (state, payload) => {
                debug!(state = %state, kind = ?payload.kind(), "Protocol event ignored");
            }
        }
    }

    async fn handle_exit(&mut self, stage: StageKind, exit_code: Option<i32>) {
        match self.state {
            KioskState::Idle => {
                info!(exit_code = ?exit_code, "Idle screen exited");
            }
            KioskState::UserInput => {
                info!("User input ended without data");
                self.enter_idle().await;
            }
            KioskState::Detection => {
                self.detection_restarts += 1;
                let exhausted = self
                    .config
                    .detection
                    .max_restarts
                    .is_some_and(|limit| self.detection_restarts > limit);
                if exhausted {
                    error!(
                        restarts = self.detection_restarts - 1,
                        "Detection keeps exiting, abandoning session"
                    );
                    self.persist_session();
                    self.enter_idle().await;
                } else {
                    warn!(
                        exit_code = ?exit_code,
                        attempt = self.detection_restarts,
                        "Detection exited, restarting"
                    );
                    tokio::time::sleep(self.config.detection.restart_delay()).await;
                    self.launch_detection().await;
                }
            }
            KioskState::Photo => {
                self.finish_photo().await;
            }
            KioskState::Review => {
                info!("Review ended without result, saving session");
                self.persist_session();
                self.enter_idle().await;
            }
        }
        debug!(stage = %stage, state = %self.state, "Exit handled");
    }

    /// Stop the kiosk: terminate the active stage, switch the indicator off
    /// and drop in-flight records.
    pub async fn shutdown(&mut self) {
        info!("Shutting down");
        if let Err(stage) = self.stop_active().await {
            error!(stage = %stage, "Stage left running at shutdown");
        }
        self.indicator.set_indicator(false);
        if self.config.session.cleanup_temp_on_exit {
            let removed = self.store.cleanup_temp_files();
            debug!(removed, "Temp session files removed");
        }
    }

    async fn start_visit(&mut self) {
        self.session = self.store.create(SessionStore::new_session_id());
        info!(session_id = %self.session.session_id, "New session");
        self.transition(KioskState::UserInput);

        let request = requests::user_input(&self.config);
        if let Err(err) = self.launch(request).await {
            warn!(error = %err, "User input unavailable, using default user data");
            self.apply_user_data(&fallback_user_data());
            self.enter_detection().await;
        }
    }

    fn apply_user_data(&mut self, payload: &serde_json::Value) {
        if !payload.is_object() {
            warn!("User data is not a JSON object");
        }
        let patch = SessionPatch::from_user_data(payload);
        self.session.merge(&patch);
        debug!(
            story_id = ?self.session.story_id,
            names = ?self.session.users.names,
            "Session updated from user data"
        );
        self.write_temp();
    }

    async fn enter_detection(&mut self) {
        self.transition(KioskState::Detection);
        self.detection_restarts = 0;
        self.store
            .absorb_latest_artifact(&mut self.session, DETECTION_ARTIFACT_PREFIX);
        self.launch_detection().await;
    }

    async fn launch_detection(&mut self) {
        let request = requests::detection(&self.config, &self.session);
        if let Err(err) = self.launch(request).await {
            error!(error = %err, "Detection unavailable, ending session");
            self.persist_session();
            self.enter_idle().await;
        }
    }

    async fn capture(&mut self) {
        // A failure here resurfaces from the photo launch below.
        let _ = self.stop_active().await;
        self.indicator.set_indicator(true);
        self.transition(KioskState::Photo);

        self.store
            .absorb_latest_artifact(&mut self.session, DETECTION_ARTIFACT_PREFIX);
        self.write_temp();

        let request = requests::photo(&self.config, &self.session);
        if let Err(err) = self.launch(request).await {
            warn!(error = %err, "Photo capture unavailable, back to detection");
            self.indicator.set_indicator(false);
            self.enter_detection().await;
        }
    }

    fn apply_path_update(&mut self, field: PathField, value: &Path) {
        let value = value.display().to_string();
        info!(field = field.name(), path = %value, "Path updated");
        let patch = match field {
            PathField::ImagePath => SessionPatch {
                image_path: Some(value),
                ..SessionPatch::default()
            },
            PathField::CacheImagePath => SessionPatch {
                cache_image_path: Some(value),
                ..SessionPatch::default()
            },
        };
        self.session.merge(&patch);
        self.write_temp();
    }

    async fn finish_photo(&mut self) {
        self.indicator.set_indicator(false);
        self.store
            .absorb_latest_artifact(&mut self.session, PHOTO_ARTIFACT_PREFIX);

        if !self.image_exists() {
            if let Some(snapshot) = self.store.find_latest_snapshot() {
                let snapshot = snapshot
                    .strip_prefix(&self.root)
                    .map(Path::to_path_buf)
                    .unwrap_or(snapshot);
                info!(path = %snapshot.display(), "Using latest snapshot");
                self.session.image_path = snapshot.display().to_string();
            }
        }

        if !self.image_exists() {
            warn!("No snapshot found, back to detection");
            self.enter_detection().await;
            return;
        }

        self.write_temp();
        self.transition(KioskState::Review);
        let request = requests::review(&self.config, &self.session);
        if let Err(err) = self.launch(request).await {
            warn!(error = %err, "Review unavailable, saving session");
            self.persist_session();
            self.enter_idle().await;
        }
    }

    fn image_exists(&self) -> bool {
        self.session.has_image() && self.root.join(&self.session.image_path).is_file()
    }

    async fn enter_idle(&mut self) {
        self.indicator.set_indicator(false);
        self.transition(KioskState::Idle);
        let request = requests::idle(&self.config);
        if let Err(err) = self.launch(request).await {
            info!(error = %err, "Running without idle screen");
        }
    }

    fn transition(&mut self, next: KioskState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "State transition");
        }
        self.state = next;
    }

    /// Terminate the active stage, then launch `request` as the new one.
    ///
    /// Nothing is launched while a terminated stage is still running.
    async fn launch(&mut self, request: StageRequest) -> SupervisorResult<()> {
        let stage = request.stage;
        self.stop_active()
            .await
            .map_err(|running| SupervisorError::StageStillRunning { stage, running })?;
        let instance = self.launcher.spawn(request).await?;
        self.active = Some(ActiveStage { stage, instance });
        Ok(())
    }

    /// Terminate the active stage and retry any lingering ones. Fails with
    /// the kind of a stage that is still running.
    async fn stop_active(&mut self) -> Result<(), StageKind> {
        if let Some(active) = self.active.take() {
            self.lingering.push(active);
        }

        let mut survivors = Vec::new();
        for stage in std::mem::take(&mut self.lingering) {
            let outcome = self.launcher.terminate(stage.instance).await;
            if outcome == TerminationOutcome::Unresponsive {
                error!(stage = %stage.stage, "Stage could not be stopped");
                survivors.push(stage);
            }
        }
        self.lingering = survivors;

        match self.lingering.first() {
            Some(stage) => Err(stage.stage),
            None => Ok(()),
        }
    }

    fn write_temp(&self) {
        if let Err(err) = self.store.write_temp(&self.session) {
            warn!(session_id = %self.session.session_id, error = %err, "Failed to write temp session");
        }
    }

    fn persist_session(&mut self) {
        if self.session.session_id.is_empty() {
            return;
        }
        if let Err(err) = self.store.persist(&mut self.session) {
            error!(session_id = %self.session.session_id, error = %err, "Failed to save session");
        }
    }
}

#[cfg(test)]
mod tests;

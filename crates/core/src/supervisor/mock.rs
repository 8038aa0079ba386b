//! Scripted stage launcher for testing.
//!
//! Records every launch and termination instead of starting processes. It
//! can be told to fail launches for chosen stages, or to leave chosen stages
//! running when asked to terminate them.

use crate::supervisor::error::{SupervisorError, SupervisorResult};
use crate::supervisor::process::TerminationOutcome;
use crate::supervisor::{StageLauncher, StageRequest};
use async_trait::async_trait;
use pb_protocol::ipc::{Event, StageInstanceId};
use pb_protocol::stage_models::StageKind;
use std::collections::HashSet;
use uuid::Uuid;

/// A launched instance as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockStage {
    pub instance: StageInstanceId,
    pub request: StageRequest,
}

#[derive(Debug, Default)]
pub struct MockLauncher {
    failing: HashSet<StageKind>,
    stuck: HashSet<StageKind>,
    spawned: Vec<MockStage>,
    terminated: Vec<StageInstanceId>,
    live: Vec<StageInstanceId>,
    max_live_at_spawn: usize,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launches of `stage` fail with `LaunchFailure`.
    pub fn failing(mut self, stage: StageKind) -> Self {
        self.failing.insert(stage);
        self
    }

    pub fn set_failing(&mut self, stage: StageKind, failing: bool) {
        if failing {
            self.failing.insert(stage);
        } else {
            self.failing.remove(&stage);
        }
    }

    /// Instances of `stage` survive termination until [`MockLauncher::exit`].
    pub fn stuck(mut self, stage: StageKind) -> Self {
        self.stuck.insert(stage);
        self
    }

    pub fn set_stuck(&mut self, stage: StageKind, stuck: bool) {
        if stuck {
            self.stuck.insert(stage);
        } else {
            self.stuck.remove(&stage);
        }
    }

    fn stage_of(&self, instance: StageInstanceId) -> Option<StageKind> {
        self.spawned
            .iter()
            .find(|s| s.instance == instance)
            .map(|s| s.request.stage)
    }

    /// Every successful launch, in order.
    pub fn spawned(&self) -> &[MockStage] {
        &self.spawned
    }

    pub fn spawned_stages(&self) -> Vec<StageKind> {
        self.spawned.iter().map(|s| s.request.stage).collect()
    }

    pub fn spawn_count(&self, stage: StageKind) -> usize {
        self.spawned
            .iter()
            .filter(|s| s.request.stage == stage)
            .count()
    }

    pub fn last_spawned(&self) -> Option<&MockStage> {
        self.spawned.last()
    }

    pub fn terminated(&self) -> &[StageInstanceId] {
        &self.terminated
    }

    pub fn was_terminated(&self, instance: StageInstanceId) -> bool {
        self.terminated.contains(&instance)
    }

    /// Instances launched and neither terminated nor exited.
    pub fn live(&self) -> &[StageInstanceId] {
        &self.live
    }

    /// Largest number of live instances observed when a launch happened,
    /// counting the new one.
    pub fn max_live_at_spawn(&self) -> usize {
        self.max_live_at_spawn
    }

    /// Simulate the instance exiting on its own and return the event the
    /// real supervisor would post.
    pub fn exit(&mut self, instance: StageInstanceId, exit_code: Option<i32>) -> Option<Event> {
        let stage = self.stage_of(instance)?;
        self.live.retain(|id| *id != instance);
        Some(Event::ProcessExited {
            stage,
            instance,
            exit_code,
        })
    }
}

#[async_trait]
impl StageLauncher for MockLauncher {
    async fn spawn(&mut self, request: StageRequest) -> SupervisorResult<StageInstanceId> {
        if self.failing.contains(&request.stage) || !request.enabled {
            return Err(SupervisorError::LaunchFailure {
                stage: request.stage,
                reason: "mock launch failure".to_string(),
            });
        }

        let instance = Uuid::new_v4();
        self.live.push(instance);
        self.max_live_at_spawn = self.max_live_at_spawn.max(self.live.len());
        self.spawned.push(MockStage { instance, request });
        Ok(instance)
    }

    async fn terminate(&mut self, instance: StageInstanceId) -> TerminationOutcome {
        let was_live = self.live.contains(&instance);
        self.terminated.push(instance);
        if was_live && self.stage_of(instance).is_some_and(|stage| self.stuck.contains(&stage)) {
            return TerminationOutcome::Unresponsive;
        }
        self.live.retain(|id| *id != instance);
        if was_live {
            TerminationOutcome::Graceful
        } else {
            TerminationOutcome::AlreadyExited
        }
    }
}

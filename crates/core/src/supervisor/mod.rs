//! Stage program supervision.
//!
//! The [`ProcessSupervisor`] launches stage programs, attaches their output
//! readers, and terminates them with the graceful-then-kill contract. The
//! orchestrator talks to it through the [`StageLauncher`] trait so the state
//! machine can be driven by a scripted launcher in tests.

pub mod error;
pub mod mock;
pub mod process;

pub use error::{SupervisorError, SupervisorResult};
pub use process::{ExitState, StageProcess, TerminationOutcome};

use async_trait::async_trait;
use pb_protocol::config_models::{StageCommand, SupervisorConfig};
use pb_protocol::ipc::StageInstanceId;
use pb_protocol::stage_models::StageKind;
use pb_protocol::EventSender;
use process::StageContext;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything needed to launch one stage program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRequest {
    pub stage: StageKind,
    pub enabled: bool,
    pub program: String,
    pub script: Option<PathBuf>,
    pub args: Vec<String>,
    /// Overlay on top of the kiosk's own environment.
    pub env: BTreeMap<String, String>,
}

impl StageRequest {
    /// Start from the configured command for `stage`.
    pub fn from_command(stage: StageKind, command: &StageCommand) -> Self {
        Self {
            stage,
            enabled: command.enabled,
            program: command.program.clone(),
            script: command.script.clone(),
            args: command.args.clone(),
            env: command.env.clone(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Full command line, for logs.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.clone()];
        if let Some(script) = &self.script {
            parts.push(script.display().to_string());
        }
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Launches and stops stage programs on behalf of the orchestrator.
#[async_trait]
pub trait StageLauncher: Send {
    /// Launch a stage program and return the id its events will carry.
    async fn spawn(&mut self, request: StageRequest) -> SupervisorResult<StageInstanceId>;

    /// Stop a stage instance. Unknown or already exited instances are a
    /// no-op.
    async fn terminate(&mut self, instance: StageInstanceId) -> TerminationOutcome;
}

/// Spawns real child processes.
#[derive(Debug)]
pub struct ProcessSupervisor {
    working_dir: PathBuf,
    config: SupervisorConfig,
    events: EventSender,
    processes: HashMap<StageInstanceId, StageProcess>,
}

impl ProcessSupervisor {
    /// Stage programs run in `working_dir` and post their events to `events`.
    pub fn new(working_dir: impl Into<PathBuf>, config: SupervisorConfig, events: EventSender) -> Self {
        Self {
            working_dir: working_dir.into(),
            config,
            events,
            processes: HashMap::new(),
        }
    }

    /// Number of tracked programs that have not exited.
    pub fn live_count(&self) -> usize {
        self.processes
            .values()
            .filter(|process| !process.has_exited())
            .count()
    }

    pub fn process(&self, instance: StageInstanceId) -> Option<&StageProcess> {
        self.processes.get(&instance)
    }

    /// Terminate every tracked program.
    pub async fn terminate_all(&mut self) {
        let instances: Vec<_> = self.processes.keys().copied().collect();
        for instance in instances {
            self.terminate(instance).await;
        }
    }

    fn resolve_program(&self, request: &StageRequest) -> SupervisorResult<PathBuf> {
        let launch_failure = |reason: String| SupervisorError::LaunchFailure {
            stage: request.stage,
            reason,
        };

        if !request.enabled {
            return Err(launch_failure("stage is disabled".to_string()));
        }

        let program = which::which_in(
            &request.program,
            std::env::var_os("PATH"),
            &self.working_dir,
        )
        .map_err(|err| launch_failure(format!("program '{}' not found: {err}", request.program)))?;

        if let Some(script) = &request.script {
            let script_path = resolve_in(&self.working_dir, script);
            if !script_path.is_file() {
                return Err(launch_failure(format!(
                    "script {} not found",
                    script_path.display()
                )));
            }
        }

        Ok(program)
    }
}

fn resolve_in(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

#[async_trait]
impl StageLauncher for ProcessSupervisor {
    async fn spawn(&mut self, request: StageRequest) -> SupervisorResult<StageInstanceId> {
        self.processes.retain(|_, process| !process.has_exited());

        let program = self.resolve_program(&request)?;
        let stage = request.stage;

        let mut cmd = Command::new(&program);
        if let Some(script) = &request.script {
            cmd.arg(script);
        }
        cmd.args(&request.args)
            .envs(&request.env)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so termination reaches the whole stage.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|err| SupervisorError::LaunchFailure {
            stage,
            reason: format!("failed to start '{}': {err}", program.display()),
        })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.start_kill();
            return Err(SupervisorError::StreamCapture { stage });
        };

        let instance = Uuid::new_v4();
        let context = StageContext {
            stage,
            instance,
            events: self.events.clone(),
            stage_dir: self.working_dir.clone(),
        };
        let process = StageProcess::attach(child, stdout, stderr, context, &self.config);

        info!(
            stage = %stage,
            pid = ?process.pid(),
            command = %request.display_command(),
            "Stage started"
        );
        self.processes.insert(instance, process);
        Ok(instance)
    }

    async fn terminate(&mut self, instance: StageInstanceId) -> TerminationOutcome {
        let Some(mut process) = self.processes.remove(&instance) else {
            return TerminationOutcome::AlreadyExited;
        };

        let outcome = process.terminate(&self.config).await;
        debug!(stage = %process.stage(), ?outcome, "Stage terminated");
        if outcome == TerminationOutcome::Unresponsive {
            // Keep the handle so a later terminate can retry.
            self.processes.insert(instance, process);
        }
        outcome
    }
}

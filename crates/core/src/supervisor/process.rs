//! Lifecycle of one spawned stage program.
//!
//! A [`StageProcess`] is created with its child already running. A watcher
//! task owns the child and both output readers; it publishes the exit on a
//! watch channel as soon as the child is reaped, lets the readers drain, and
//! then posts exactly one `ProcessExited` event.

use crate::parser;
use pb_protocol::config_models::SupervisorConfig;
use pb_protocol::ipc::{Event, ProtocolEvent, StageInstanceId, StageLine, StreamKind};
use pb_protocol::stage_models::StageKind;
use pb_protocol::EventSender;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Whether a stage program is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    /// `None` when the program was ended by a signal.
    Exited(Option<i32>),
}

impl ExitState {
    pub fn has_exited(self) -> bool {
        matches!(self, ExitState::Exited(_))
    }
}

/// How a [`StageProcess::terminate`] call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The program had already exited; nothing was sent.
    AlreadyExited,
    /// The program exited within the grace period.
    Graceful,
    /// The program had to be killed.
    Killed,
    /// The program survived the kill window too.
    Unresponsive,
}

/// Shared context for the tasks attached to one stage program.
#[derive(Debug, Clone)]
pub(crate) struct StageContext {
    pub stage: StageKind,
    pub instance: StageInstanceId,
    pub events: EventSender,
    /// Working directory of the program, used to check reported paths.
    pub stage_dir: PathBuf,
}

/// Handle on one running (or recently exited) stage program.
#[derive(Debug)]
pub struct StageProcess {
    stage: StageKind,
    instance: StageInstanceId,
    pid: Option<u32>,
    spawned_at: Instant,
    exit_rx: watch::Receiver<ExitState>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl StageProcess {
    /// Attach readers and the exit watcher to a freshly spawned child.
    pub(crate) fn attach(
        mut child: Child,
        stdout: ChildStdout,
        stderr: ChildStderr,
        context: StageContext,
        config: &SupervisorConfig,
    ) -> Self {
        let pid = child.id();
        let (exit_tx, exit_rx) = watch::channel(ExitState::Running);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let readers = vec![
            tokio::spawn(read_stream(context.clone(), StreamKind::Stdout, stdout)),
            tokio::spawn(read_stream(context.clone(), StreamKind::Stderr, stderr)),
        ];
        let drain = config.reader_drain();
        let spawned_at = Instant::now();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    #[cfg(unix)]
                    if let Some(pid) = pid {
                        signal_group(pid, libc::SIGKILL, context.stage);
                    }
                    if let Err(err) = child.kill().await {
                        debug!(stage = %context.stage, error = %err, "Kill failed");
                    }
                    child.wait().await
                }
            };

            let exit_code = match status {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!(stage = %context.stage, error = %err, "Failed to wait for stage");
                    None
                }
            };
            let _ = exit_tx.send(ExitState::Exited(exit_code));

            drain_readers(readers, drain, context.stage).await;

            info!(
                stage = %context.stage,
                exit_code = ?exit_code,
                runtime_ms = spawned_at.elapsed().as_millis() as u64,
                "Stage exited"
            );
            let _ = context
                .events
                .send(Event::ProcessExited {
                    stage: context.stage,
                    instance: context.instance,
                    exit_code,
                })
                .await;
        });

        Self {
            stage: context.stage,
            instance: context.instance,
            pid,
            spawned_at,
            exit_rx,
            kill_tx: Some(kill_tx),
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn instance(&self) -> StageInstanceId {
        self.instance
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn uptime(&self) -> Duration {
        self.spawned_at.elapsed()
    }

    pub fn exit_state(&self) -> ExitState {
        *self.exit_rx.borrow()
    }

    pub fn has_exited(&self) -> bool {
        self.exit_state().has_exited()
    }

    /// Wait up to `limit` for the program to exit.
    pub async fn wait_exit(&mut self, limit: Duration) -> bool {
        match tokio::time::timeout(limit, self.exit_rx.wait_for(|state| state.has_exited())).await
        {
            Ok(_) => true,
            Err(_) => false,
        }
    }

    /// Ask the program to stop, then kill it if it does not.
    ///
    /// Sends SIGTERM and waits `grace_period`; if the program is still
    /// running it is killed and given `kill_timeout` more. Calling this on a
    /// program that already exited does nothing.
    pub async fn terminate(&mut self, config: &SupervisorConfig) -> TerminationOutcome {
        if self.has_exited() {
            return TerminationOutcome::AlreadyExited;
        }

        if let Some(pid) = self.pid {
            request_stop(pid, self.stage);
        }
        if self.wait_exit(config.grace_period()).await {
            debug!(stage = %self.stage, "Stage stopped gracefully");
            return TerminationOutcome::Graceful;
        }

        warn!(stage = %self.stage, "Stage ignored termination request, killing");
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
        if self.wait_exit(config.kill_timeout()).await {
            TerminationOutcome::Killed
        } else {
            warn!(stage = %self.stage, pid = ?self.pid, "Stage did not exit after kill");
            TerminationOutcome::Unresponsive
        }
    }
}

/// Signal the stage's whole process group.
///
/// Stages are spawned as group leaders, so this also reaches helpers a
/// script started without `exec`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int, stage: StageKind) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc != 0 {
        debug!(stage = %stage, signal, error = %std::io::Error::last_os_error(), "Signal failed");
    }
}

#[cfg(unix)]
fn request_stop(pid: u32, stage: StageKind) {
    signal_group(pid, libc::SIGTERM, stage);
}

#[cfg(not(unix))]
fn request_stop(_pid: u32, _stage: StageKind) {}

async fn drain_readers(readers: Vec<JoinHandle<()>>, limit: Duration, stage: StageKind) {
    let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
    let joined = tokio::time::timeout(limit, async {
        for reader in readers {
            let _ = reader.await;
        }
    })
    .await;

    if joined.is_err() {
        // A grandchild can keep the pipes open after the stage itself exits.
        debug!(stage = %stage, "Output readers still open after exit, detaching");
        for abort in aborts {
            abort.abort();
        }
    }
}

/// Read one output stream line by line and post protocol events.
///
/// Invalid UTF-8 is replaced rather than treated as an error; the reader
/// only stops at end of stream or when the event queue is gone.
async fn read_stream<R>(context: StageContext, stream: StreamKind, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(stage = %context.stage, %stream, error = %err, "Stage stream read failed");
                break;
            }
        }

        let line = StageLine {
            stage: context.stage,
            stream,
            raw_text: String::from_utf8_lossy(&buf).trim_end().to_string(),
        };
        if !dispatch_line(&context, &line).await {
            break;
        }
    }
}

/// Returns false once the event queue has closed.
async fn dispatch_line(context: &StageContext, line: &StageLine) -> bool {
    let payload = match parser::parse_line(line) {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            if !line.raw_text.is_empty() {
                debug!(stage = %line.stage, stream = %line.stream, "{}", line.raw_text);
            }
            return true;
        }
        Err(err) => {
            warn!(stage = %line.stage, stream = %line.stream, error = %err, "Discarding protocol line");
            return true;
        }
    };

    let Some(payload) = parser::validate(payload, &context.stage_dir) else {
        debug!(stage = %line.stage, line = %line.raw_text, "Ignoring path update for missing file");
        return true;
    };

    debug!(stage = %line.stage, kind = ?payload.kind(), "Protocol event");
    context
        .events
        .send(Event::Protocol(ProtocolEvent {
            stage: context.stage,
            instance: context.instance,
            payload,
        }))
        .await
        .is_ok()
}

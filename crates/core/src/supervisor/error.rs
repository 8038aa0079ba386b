//! Error types for stage process supervision.

use pb_protocol::stage_models::StageKind;
use thiserror::Error;

/// Errors that can occur while launching a stage program.
///
/// The orchestrator answers these with the per-state fallback; they never
/// end the kiosk loop.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The program or its script could not be found or started.
    #[error("Failed to launch {stage} stage: {reason}")]
    LaunchFailure { stage: StageKind, reason: String },

    /// The child started but its output streams could not be attached.
    #[error("Failed to capture output of {stage} stage")]
    StreamCapture { stage: StageKind },

    /// An earlier stage survived termination; nothing new is started until
    /// it exits.
    #[error("Cannot launch {stage} stage while {running} stage is still running")]
    StageStillRunning { stage: StageKind, running: StageKind },
}

/// Type alias for Result with SupervisorError.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

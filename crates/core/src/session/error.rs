//! Error types for session record I/O.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or removing session records.
///
/// None of these are fatal to the kiosk: the in-memory session stays
/// authoritative and callers log the error and carry on.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Filesystem operation on a session file failed.
    #[error("Session I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The session could not be encoded as JSON.
    #[error("Failed to serialize session {session_id}: {source}")]
    Serialize {
        session_id: String,
        source: serde_json::Error,
    },

    /// The fully written temp file could not be renamed into place.
    #[error("Failed to move session file into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Type alias for Result with SessionError.
pub type SessionResult<T> = Result<T, SessionError>;

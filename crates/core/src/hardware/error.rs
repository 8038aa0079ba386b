//! Error types for the hardware inputs and indicator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while bringing up or polling the GPIO lines.
///
/// None of these stop the kiosk; it falls back to override-only mode.
#[derive(Error, Debug)]
pub enum HardwareError {
    /// GPIO lines cannot be used on this host.
    #[error("GPIO unavailable: {reason}")]
    Unavailable { reason: String },

    /// A sysfs attribute could not be read or written.
    #[error("GPIO I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Type alias for Result with HardwareError.
pub type HardwareResult<T> = Result<T, HardwareError>;

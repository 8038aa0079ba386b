//! Error types for stage output parsing.

use thiserror::Error;

/// A line carried a known sentinel but its body was unusable.
///
/// Parse errors only ever discard the offending line; the stream keeps
/// being read.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The body of a `DATA:` line is not valid JSON.
    #[error("Invalid JSON after {prefix}: {source}")]
    InvalidJson {
        prefix: &'static str,
        source: serde_json::Error,
    },

    /// A `PATH_UPDATE:` line without `<field>=<value>` or with an unknown field.
    #[error("Malformed PATH_UPDATE line: {0}")]
    MalformedPathUpdate(String),

    /// A `RESULT:` line with nothing after the prefix.
    #[error("RESULT line carries no token")]
    EmptyResult,
}

/// Type alias for Result with ParseError.
pub type ParseResult<T> = Result<T, ParseError>;

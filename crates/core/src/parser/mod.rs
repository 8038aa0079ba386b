//! Line grammar for stage program output.
//!
//! Stage programs talk to the orchestrator by printing sentinel lines:
//!
//! | Line | Payload |
//! |---|---|
//! | `RESULT:<token>` / `PREVIEW_RESULT:<token>` | [`ProtocolPayload::Result`] |
//! | `DATA:<json>` / `USER_DATA:<json>` | [`ProtocolPayload::UserData`] |
//! | `PATH_UPDATE:<field>=<path>` | [`ProtocolPayload::PathUpdate`] |
//! | `... Final snapshot saved to <path>` | `PathUpdate` for `image_path` |
//! | `... Cache image saved to <path>` | `PathUpdate` for `cache_image_path` |
//!
//! Anything else is diagnostic output and is only logged.
//!
//! [`parse_line`] is pure. Whether a path update names an existing file is
//! checked separately by [`validate`], against the directory the stage
//! runs in.

pub mod error;

pub use error::{ParseError, ParseResult};

use pb_protocol::ipc::{PathField, ProtocolPayload, StageLine};
use pb_protocol::stage_models::ReviewDecision;
use std::path::{Path, PathBuf};

const RESULT_PREFIXES: [&str; 2] = ["RESULT:", "PREVIEW_RESULT:"];
const DATA_PREFIXES: [&str; 2] = ["DATA:", "USER_DATA:"];
const PATH_UPDATE_PREFIX: &str = "PATH_UPDATE:";

/// Free-text markers printed by the photo stage, and the field each sets.
const SAVED_TO_MARKERS: [(&str, PathField); 2] = [
    ("Final snapshot saved to", PathField::ImagePath),
    ("Cache image saved to", PathField::CacheImagePath),
];

/// Parse one line of stage output.
///
/// Returns `Ok(None)` for lines that match no rule, including blank lines.
///
/// # Errors
///
/// Returns `ParseError` when a line carries a sentinel prefix but its body
/// cannot be interpreted.
///
/// # Example
///
/// ```
/// use pb_core::parser::parse_line;
/// use pb_protocol::{ProtocolPayload, ReviewDecision, StageKind, StageLine, StreamKind};
///
/// let line = StageLine {
///     stage: StageKind::Review,
///     stream: StreamKind::Stdout,
///     raw_text: "RESULT:continue".to_string(),
/// };
/// let payload = parse_line(&line).unwrap();
/// assert_eq!(payload, Some(ProtocolPayload::Result(ReviewDecision::Continue)));
/// ```
pub fn parse_line(line: &StageLine) -> ParseResult<Option<ProtocolPayload>> {
    parse_text(&line.raw_text)
}

fn parse_text(raw: &str) -> ParseResult<Option<ProtocolPayload>> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }

    if let Some(token) = strip_any(text, &RESULT_PREFIXES) {
        let token = token.trim();
        if token.is_empty() {
            return Err(ParseError::EmptyResult);
        }
        return Ok(Some(ProtocolPayload::Result(ReviewDecision::from_token(
            token,
        ))));
    }

    for prefix in DATA_PREFIXES {
        if let Some(body) = text.strip_prefix(prefix) {
            let value = serde_json::from_str(body.trim())
                .map_err(|source| ParseError::InvalidJson { prefix, source })?;
            return Ok(Some(ProtocolPayload::UserData(value)));
        }
    }

    if let Some(body) = text.strip_prefix(PATH_UPDATE_PREFIX) {
        return parse_path_update(body).map(Some);
    }

    for (marker, field) in SAVED_TO_MARKERS {
        if let Some((_, rest)) = text.split_once(marker) {
            let value = rest.trim().trim_start_matches(':').trim();
            if value.is_empty() {
                return Ok(None);
            }
            return Ok(Some(ProtocolPayload::PathUpdate {
                field,
                value: PathBuf::from(value),
            }));
        }
    }

    Ok(None)
}

fn strip_any<'a>(text: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes
        .iter()
        .find_map(|prefix| text.strip_prefix(prefix))
}

fn parse_path_update(body: &str) -> ParseResult<ProtocolPayload> {
    let (name, value) = body
        .split_once('=')
        .ok_or_else(|| ParseError::MalformedPathUpdate(format!("missing '=' in '{body}'")))?;

    let name = name.trim();
    let field = PathField::from_name(name)
        .ok_or_else(|| ParseError::MalformedPathUpdate(format!("unknown field '{name}'")))?;

    let value = value.trim();
    if value.is_empty() {
        return Err(ParseError::MalformedPathUpdate(format!(
            "empty value for '{name}'"
        )));
    }

    Ok(ProtocolPayload::PathUpdate {
        field,
        value: PathBuf::from(value),
    })
}

/// Drop path updates that do not name an existing file.
///
/// Relative paths are checked against `stage_dir`, the working directory
/// of the stage that printed them. Other payloads pass through unchanged.
pub fn validate(payload: ProtocolPayload, stage_dir: &Path) -> Option<ProtocolPayload> {
    let keep = match &payload {
        ProtocolPayload::PathUpdate { value, .. } => stage_dir.join(value).exists(),
        _ => true,
    };
    keep.then_some(payload)
}

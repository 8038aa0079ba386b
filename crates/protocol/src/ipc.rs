//! Event protocol between the event producers and the orchestrator.
//!
//! Every producer (hardware monitor, console, stage stream readers, stage
//! exit watchers, signal handler) posts [`Event`] values onto one ordered
//! queue. The orchestrator is the only consumer.
//!
//! Uses tagged enum serialization so events can be recorded and replayed:
//! ```json
//! {
//!   "type": "processExited",
//!   "payload": {
//!     "stage": "review",
//!     "instance": "uuid-here",
//!     "exit_code": 0
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::stage_models::{OverrideCommand, ReviewDecision, StageKind};

/// Identifies one spawn of a stage program.
///
/// Every event a stage instance produces carries this id, so events from an
/// instance that has since been replaced can be told apart from live ones.
pub type StageInstanceId = Uuid;

/// Which output stream of a stage a line came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// A raw line read from a stage's output, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLine {
    pub stage: StageKind,
    pub stream: StreamKind,
    pub raw_text: String,
}

/// Session fields a stage can update with a path.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathField {
    ImagePath,
    CacheImagePath,
}

impl PathField {
    /// Parse the field name used in `PATH_UPDATE:<field>=<value>` lines.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "image_path" => Some(PathField::ImagePath),
            "cache_image_path" | "cache_img_path" => Some(PathField::CacheImagePath),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PathField::ImagePath => "image_path",
            PathField::CacheImagePath => "cache_image_path",
        }
    }
}

/// Kinds of structured protocol events.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Result,
    UserData,
    PathUpdate,
}

/// Payload of a protocol event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolPayload {
    /// `RESULT:<token>`
    Result(ReviewDecision),
    /// `DATA:<json>`
    UserData(serde_json::Value),
    /// `PATH_UPDATE:<field>=<value>` or a recognised "saved to" marker.
    PathUpdate { field: PathField, value: PathBuf },
}

impl ProtocolPayload {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            ProtocolPayload::Result(_) => ProtocolKind::Result,
            ProtocolPayload::UserData(_) => ProtocolKind::UserData,
            ProtocolPayload::PathUpdate { .. } => ProtocolKind::PathUpdate,
        }
    }
}

/// A structured event parsed from one line of stage output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProtocolEvent {
    pub stage: StageKind,
    pub instance: StageInstanceId,
    pub payload: ProtocolPayload,
}

impl ProtocolEvent {
    pub fn kind(&self) -> ProtocolKind {
        self.payload.kind()
    }
}

/// Everything the orchestrator reacts to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// Debounced rising edge on the motion sensor.
    HardwareMotion,

    /// Debounced falling edge on the capture button.
    HardwareButton,

    /// A command typed on the override console.
    ManualOverride(OverrideCommand),

    /// A sentinel line recognised in a stage's output.
    Protocol(ProtocolEvent),

    /// A stage program exited, for whatever reason.
    ///
    /// Posted exactly once per spawned instance, after its output streams
    /// have been drained. `exit_code` is `None` when the process was ended
    /// by a signal.
    ProcessExited {
        stage: StageKind,
        instance: StageInstanceId,
        exit_code: Option<i32>,
    },

    /// Orderly shutdown was requested.
    Shutdown,
}

impl Event {
    /// The stage instance this event originates from, if any.
    pub fn instance(&self) -> Option<StageInstanceId> {
        match self {
            Event::Protocol(event) => Some(event.instance),
            Event::ProcessExited { instance, .. } => Some(*instance),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_field_names() {
        assert_eq!(PathField::from_name("image_path"), Some(PathField::ImagePath));
        assert_eq!(
            PathField::from_name("cache_img_path"),
            Some(PathField::CacheImagePath)
        );
        assert_eq!(PathField::from_name("thumbnail"), None);
        assert_eq!(PathField::CacheImagePath.name(), "cache_image_path");
    }

    #[test]
    fn test_event_instance() {
        let id = Uuid::new_v4();
        let exited = Event::ProcessExited {
            stage: StageKind::Photo,
            instance: id,
            exit_code: Some(0),
        };
        assert_eq!(exited.instance(), Some(id));
        assert_eq!(Event::HardwareButton.instance(), None);
    }
}

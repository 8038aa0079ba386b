//! Stage and kiosk state models.
//!
//! A *stage* is one external program in the visitor flow; the kiosk *state*
//! says which stage the orchestrator is currently driving.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a stage program.
///
/// Used as the tag on every event a stage produces and as the key of the
/// `[stages.*]` configuration tables.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Attract screen shown while nobody is in front of the kiosk.
    Idle,
    /// Collects the story choice and visitor names.
    UserInput,
    /// Live camera preview with prop detection.
    Detection,
    /// Countdown and snapshot capture.
    Photo,
    /// Shows the snapshot and asks to keep it or retry.
    Review,
}

impl StageKind {
    /// All stages, in flow order.
    pub const ALL: [StageKind; 5] = [
        StageKind::Idle,
        StageKind::UserInput,
        StageKind::Detection,
        StageKind::Photo,
        StageKind::Review,
    ];

    /// Short tag used in logs (`IDLE`, `UI`, `DETECTION`, `PHOTO`, `REVIEW`).
    pub fn tag(self) -> &'static str {
        match self {
            StageKind::Idle => "IDLE",
            StageKind::UserInput => "UI",
            StageKind::Detection => "DETECTION",
            StageKind::Photo => "PHOTO",
            StageKind::Review => "REVIEW",
        }
    }

    /// The kiosk state this stage runs in.
    pub fn state(self) -> KioskState {
        match self {
            StageKind::Idle => KioskState::Idle,
            StageKind::UserInput => KioskState::UserInput,
            StageKind::Detection => KioskState::Detection,
            StageKind::Photo => KioskState::Photo,
            StageKind::Review => KioskState::Review,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The orchestrator's current position in the visitor flow.
///
/// `Idle` is both the initial state and the state every cycle returns to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KioskState {
    #[default]
    Idle,
    UserInput,
    Detection,
    Photo,
    Review,
}

impl KioskState {
    /// The stage program that runs while in this state.
    pub fn stage(self) -> StageKind {
        match self {
            KioskState::Idle => StageKind::Idle,
            KioskState::UserInput => StageKind::UserInput,
            KioskState::Detection => StageKind::Detection,
            KioskState::Photo => StageKind::Photo,
            KioskState::Review => StageKind::Review,
        }
    }
}

impl fmt::Display for KioskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KioskState::Idle => "idle",
            KioskState::UserInput => "input",
            KioskState::Detection => "detect",
            KioskState::Photo => "photo",
            KioskState::Review => "review",
        };
        f.write_str(name)
    }
}

/// Commands accepted on the manual-override channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverrideCommand {
    /// Start a visitor flow; equivalent to motion while idle.
    Start,
    /// Take the photo; equivalent to the capture button during detection.
    Capture,
}

impl OverrideCommand {
    /// Parse a console command (`s` or `b`, case-insensitive).
    pub fn from_console(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "s" | "start" => Some(OverrideCommand::Start),
            "b" | "capture" => Some(OverrideCommand::Capture),
            _ => None,
        }
    }
}

/// Outcome reported by the review stage on a `RESULT:` line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Keep the photo and finish the session.
    Continue,
    /// Discard the photo and go back to detection.
    TryAgain,
    /// Any other token, kept verbatim.
    Other(String),
}

impl ReviewDecision {
    pub fn from_token(token: &str) -> Self {
        match token {
            "continue" => ReviewDecision::Continue,
            "try_again" => ReviewDecision::TryAgain,
            other => ReviewDecision::Other(other.to_string()),
        }
    }
}

//! Kiosk configuration models for `.photobooth/config.toml`.
//!
//! Every field has a default, so an empty (or missing) file yields a
//! working configuration for the stock stage programs.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::stage_models::StageKind;

/// Represents the whole of `.photobooth/config.toml`.
///
/// # Example
///
/// ```toml
/// # .photobooth/config.toml
/// [hardware]
/// enabled = false
///
/// [photo]
/// countdown_secs = 3
///
/// [stages.review]
/// program = "/opt/booth/review"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct KioskConfig {
    pub paths: PathsConfig,
    pub hardware: HardwareConfig,
    pub supervisor: SupervisorConfig,
    pub stages: StagesConfig,
    pub detection: DetectionConfig,
    pub photo: PhotoConfig,
    pub session: SessionConfig,
}

/// Directories shared with the stage programs.
///
/// Relative paths are resolved against the project root.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Temp records, stage artifacts and permanent session records.
    pub data_dir: PathBuf,
    /// Half-resolution cache images.
    pub cache_dir: PathBuf,
    /// Full snapshots (`snapshot_*.jpg`).
    pub snapshot_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_dir: PathBuf::from("cache"),
            snapshot_dir: PathBuf::from("snapshots"),
        }
    }
}

/// Digital inputs and the indicator output.
///
/// Pin numbers are the kernel GPIO numbers exposed under `gpio_root`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HardwareConfig {
    /// When false the kiosk runs in override-only mode without touching GPIO.
    pub enabled: bool,
    pub gpio_root: PathBuf,
    pub motion_pin: u32,
    pub button_pin: u32,
    pub indicator_pin: u32,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            motion_pin: 23,
            button_pin: 17,
            indicator_pin: 24,
            debounce_ms: 500,
            poll_interval_ms: 10,
        }
    }
}

impl HardwareConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Termination timing for stage programs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// How long a stage gets to exit after the graceful request.
    pub grace_period_ms: u64,
    /// How long to wait after the forced kill.
    pub kill_timeout_ms: u64,
    /// How long the exit watcher waits for output readers to drain.
    pub reader_drain_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1000,
            kill_timeout_ms: 1000,
            reader_drain_ms: 500,
        }
    }
}

impl SupervisorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn reader_drain(&self) -> Duration {
        Duration::from_millis(self.reader_drain_ms)
    }
}

/// How to launch one stage program.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StageCommand {
    /// A disabled stage is treated as not launchable.
    pub enabled: bool,
    /// Executable name (looked up on `PATH`) or path.
    pub program: String,
    /// Script handed to `program`; it must exist for the stage to launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    /// Extra arguments placed after the script and before stage arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for StageCommand {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "python3".to_string(),
            script: None,
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

impl StageCommand {
    /// A `python3 <script>` command.
    pub fn python(script: &str) -> Self {
        Self {
            script: Some(PathBuf::from(script)),
            ..Self::default()
        }
    }
}

/// Launch commands for every stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StagesConfig {
    pub idle: StageCommand,
    pub user_input: StageCommand,
    pub detection: StageCommand,
    pub photo: StageCommand,
    pub review: StageCommand,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            idle: StageCommand::python("idle_screen.py"),
            user_input: StageCommand::python("user_input_app.py"),
            detection: StageCommand::python("detection_app.py"),
            photo: StageCommand::python("photo_capture.py"),
            review: StageCommand::python("photo_preview.py"),
        }
    }
}

impl StagesConfig {
    pub fn get(&self, stage: StageKind) -> &StageCommand {
        match stage {
            StageKind::Idle => &self.idle,
            StageKind::UserInput => &self.user_input,
            StageKind::Detection => &self.detection,
            StageKind::Photo => &self.photo,
            StageKind::Review => &self.review,
        }
    }

    pub fn get_mut(&mut self, stage: StageKind) -> &mut StageCommand {
        match stage {
            StageKind::Idle => &mut self.idle,
            StageKind::UserInput => &mut self.user_input,
            StageKind::Detection => &mut self.detection,
            StageKind::Photo => &mut self.photo,
            StageKind::Review => &mut self.review,
        }
    }
}

/// Detection stage parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    /// Passed as `-i <input_source>`.
    pub input_source: String,
    /// Consecutive unrequested exits tolerated in one detection visit
    /// before the session is saved and the kiosk returns to idle. Unset
    /// means detection is respawned for as long as it keeps exiting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,
    /// Pause before respawning detection after an unrequested exit.
    pub restart_delay_ms: u64,
    /// `DISPLAY` value used when the environment has none.
    pub display: String,
}

impl DetectionConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_source: "rpi".to_string(),
            max_restarts: None,
            restart_delay_ms: 500,
            display: ":0".to_string(),
        }
    }
}

/// Photo stage parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PhotoConfig {
    pub countdown_secs: u32,
    pub fullscreen: bool,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 5,
            fullscreen: true,
        }
    }
}

/// Session file housekeeping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Remove in-flight temp records on shutdown.
    pub cleanup_temp_on_exit: bool,
    /// Persist temp records left behind by a previous run at startup.
    pub recover_orphans: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cleanup_temp_on_exit: true,
            recover_orphans: true,
        }
    }
}

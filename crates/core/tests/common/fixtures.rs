//! Temporary kiosk projects whose stage programs are shell scripts.

use pb_protocol::config_models::{KioskConfig, StageCommand, SupervisorConfig};
use pb_protocol::stage_models::StageKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A project root with data directories and stage scripts.
///
/// The directory is removed when the value is dropped.
pub struct StageProject {
    dir: TempDir,
}

#[allow(dead_code)]
impl StageProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        for name in ["data", "cache", "snapshots", "stages"] {
            std::fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    /// Write `stages/<name>.sh` and return the `sh` command running it.
    pub fn script(&self, name: &str, body: &str) -> StageCommand {
        let relative = PathBuf::from("stages").join(format!("{name}.sh"));
        std::fs::write(self.root().join(&relative), format!("#!/bin/sh\n{body}\n")).unwrap();
        StageCommand {
            program: "sh".to_string(),
            script: Some(relative),
            ..StageCommand::default()
        }
    }

    /// Configuration with short termination and restart windows, GPIO disabled and
    /// every stage pointing at a script that idles until terminated.
    pub fn config(&self) -> KioskConfig {
        let mut config = KioskConfig::default();
        config.hardware.enabled = false;
        config.supervisor = fast_supervisor();
        config.paths.data_dir = self.data_dir();
        config.paths.cache_dir = self.root().join("cache");
        config.paths.snapshot_dir = self.root().join("snapshots");
        config.photo.fullscreen = false;
        config.photo.countdown_secs = 1;
        config.detection.restart_delay_ms = 50;
        for stage in StageKind::ALL {
            *config.stages.get_mut(stage) = self.script(&stage.tag().to_lowercase(), "exec sleep 30");
        }
        config
    }

    /// File names in the data directory starting with `prefix`.
    pub fn data_files(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.data_dir())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        names
    }
}

pub fn fast_supervisor() -> SupervisorConfig {
    SupervisorConfig {
        grace_period_ms: 300,
        kill_timeout_ms: 1000,
        reader_drain_ms: 500,
    }
}

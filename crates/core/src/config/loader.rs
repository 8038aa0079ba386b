//! Configuration file loader for the `.photobooth/` directory.
//!
//! This module provides functionality to load `.photobooth/config.toml`,
//! resolve relative paths against the project root and reject values that
//! would leave the kiosk unable to run.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use pb_protocol::config_models::KioskConfig;
use pb_protocol::stage_models::StageKind;
use std::path::{Path, PathBuf};

/// Name of the project configuration directory.
pub const CONFIG_DIR: &str = ".photobooth";

/// Name of the configuration file inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Path of the configuration file for a project root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Loads the kiosk configuration for a project root.
///
/// # Arguments
///
/// * `root` - Project root containing the `.photobooth/` folder. Stage
///   programs run with this directory as their working directory.
///
/// # Returns
///
/// A `KioskConfig` whose data directories and stage scripts are absolute
/// paths under `root`. If `.photobooth/config.toml` is missing, the default
/// configuration is returned rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - The file exists but cannot be read
/// - The file is not valid TOML or has mistyped values
/// - The values fail validation (see [`validate`])
///
/// # Example
///
/// ```rust,no_run
/// use pb_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Sessions are stored in {}", config.paths.data_dir.display());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<KioskConfig> {
    let path = config_path(root);

    let mut config = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        let content =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ConfigError::FileRead {
                    path: path.clone(),
                    source,
                })?;

        toml::from_str::<KioskConfig>(&content).map_err(|source| ConfigError::TomlParse {
            path: path.clone(),
            source,
        })?
    } else {
        KioskConfig::default()
    };

    validate(&config, &path)?;
    resolve_paths(&mut config, root);

    Ok(config)
}

/// Rejects configurations the kiosk cannot run with.
fn validate(config: &KioskConfig, path: &Path) -> ConfigResult<()> {
    let invalid = |reason: String| ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    };

    for stage in StageKind::ALL {
        let command = config.stages.get(stage);
        if command.enabled && command.program.trim().is_empty() {
            return Err(invalid(format!("stage '{stage}' has an empty program")));
        }
    }

    let hardware = &config.hardware;
    if hardware.enabled {
        let pins = [
            hardware.motion_pin,
            hardware.button_pin,
            hardware.indicator_pin,
        ];
        if pins[0] == pins[1] || pins[0] == pins[2] || pins[1] == pins[2] {
            return Err(invalid(format!(
                "hardware pins must be distinct (motion {}, button {}, indicator {})",
                pins[0], pins[1], pins[2]
            )));
        }
    }

    if config.photo.countdown_secs == 0 {
        return Err(invalid("photo countdown must be at least 1 second".to_string()));
    }

    Ok(())
}

/// Makes data directories and stage scripts absolute under `root`.
fn resolve_paths(config: &mut KioskConfig, root: &Path) {
    let paths = &mut config.paths;
    for dir in [
        &mut paths.data_dir,
        &mut paths.cache_dir,
        &mut paths.snapshot_dir,
    ] {
        if dir.is_relative() {
            *dir = root.join(&*dir);
        }
    }

    for stage in StageKind::ALL {
        if let Some(script) = config.stages.get_mut(stage).script.as_mut() {
            if script.is_relative() {
                *script = root.join(&*script);
            }
        }
    }
}

/// Creates the data, cache and snapshot directories if they are missing.
pub fn ensure_directories(config: &KioskConfig) -> ConfigResult<()> {
    let paths = &config.paths;
    for dir in [&paths.data_dir, &paths.cache_dir, &paths.snapshot_dir] {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(root: &Path, content: &str) {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).expect("Failed to create .photobooth");
        fs::write(dir.join(CONFIG_FILE), content).expect("Failed to write config.toml");
    }

    #[tokio::test]
    async fn test_load_config_acceptance() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();

        write_config(
            root,
            r#"
[paths]
data_dir = "records"

[hardware]
enabled = false
debounce_ms = 250

[supervisor]
grace_period_ms = 200

[stages.user_input]
program = "sh"
script = "stages/input.sh"

[detection]
input_source = "usb"

[photo]
countdown_secs = 3
fullscreen = false
"#,
        );

        let config = load_config(root).await.expect("Failed to load config");

        assert_eq!(config.paths.data_dir, root.join("records"));
        assert_eq!(config.paths.snapshot_dir, root.join("snapshots"));
        assert!(!config.hardware.enabled);
        assert_eq!(config.hardware.debounce_ms, 250);
        assert_eq!(config.supervisor.grace_period_ms, 200);
        assert_eq!(config.supervisor.kill_timeout_ms, 1000);
        assert_eq!(config.stages.user_input.program, "sh");
        assert_eq!(
            config.stages.user_input.script,
            Some(root.join("stages/input.sh"))
        );
        assert_eq!(config.stages.review.script, Some(root.join("photo_preview.py")));
        assert_eq!(config.detection.input_source, "usb");
        assert_eq!(config.photo.countdown_secs, 3);
        assert!(!config.photo.fullscreen);
    }

    #[tokio::test]
    async fn test_load_config_empty_directory() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();

        let config = load_config(root)
            .await
            .expect("Should handle missing .photobooth");

        assert!(config.hardware.enabled);
        assert_eq!(config.paths.data_dir, root.join("data"));
        assert_eq!(config.photo.countdown_secs, 5);
    }

    #[tokio::test]
    async fn test_load_config_absolute_paths_untouched() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        write_config(root, "[paths]\ncache_dir = \"/var/cache/booth\"\n");

        let config = load_config(root).await.expect("Failed to load config");
        assert_eq!(config.paths.cache_dir, PathBuf::from("/var/cache/booth"));
    }

    #[tokio::test]
    async fn test_load_config_invalid_toml() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        write_config(root, "[hardware\nenabled = [invalid toml");

        let result = load_config(root).await;
        assert!(result.is_err(), "Should fail on invalid TOML");

        if let Err(ConfigError::TomlParse { path, .. }) = result {
            assert!(path.ends_with("config.toml"));
        } else {
            panic!("Expected TomlParse error");
        }
    }

    #[tokio::test]
    async fn test_load_config_wrong_type() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        write_config(root, "[photo]\ncountdown_secs = \"five\"\n");

        let result = load_config(root).await;
        assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
    }

    #[tokio::test]
    async fn test_load_config_duplicate_pins() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        write_config(root, "[hardware]\nmotion_pin = 17\nbutton_pin = 17\n");

        let result = load_config(root).await;
        match result {
            Err(ConfigError::InvalidConfig { reason, .. }) => {
                assert!(reason.contains("distinct"), "unexpected reason: {reason}");
            }
            other => panic!("Expected InvalidConfig, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_config_duplicate_pins_ignored_without_hardware() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        write_config(
            root,
            "[hardware]\nenabled = false\nmotion_pin = 17\nbutton_pin = 17\n",
        );

        assert!(load_config(root).await.is_ok());
    }

    #[tokio::test]
    async fn test_load_config_empty_program() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();
        write_config(root, "[stages.photo]\nprogram = \"  \"\n");

        let result = load_config(root).await;
        assert!(matches!(result, Err(ConfigError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_ensure_directories() {
        let dir = tempdir().expect("Failed to create temp dir");
        let config = load_config(dir.path()).await.expect("Failed to load config");

        ensure_directories(&config).expect("Failed to create directories");

        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("cache").is_dir());
        assert!(dir.path().join("snapshots").is_dir());
    }
}

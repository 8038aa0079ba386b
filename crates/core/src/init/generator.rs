//! File generation for `photobooth init`.

use super::error::{InitError, InitResult};
use super::templates::{get_template, list_templates};
use crate::config::{config_path, ensure_directories, load_config};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_TEMPLATE: &str = "config.toml";
const DEMO_CONFIG_TEMPLATE: &str = "demo/config.toml";
const DEMO_PREFIX: &str = "demo/";

/// Options for initializing a kiosk project.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Project root that receives `.photobooth/`.
    pub target_dir: PathBuf,

    /// Overwrite an existing configuration file.
    pub force: bool,

    /// Write the demo configuration and its shell stage programs.
    pub demo: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            target_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            force: false,
            demo: false,
        }
    }
}

/// Initialize a kiosk project and return the path of the written config.
///
/// This function creates the following structure:
/// ```text
/// <target_dir>/
/// ├── .photobooth/
/// │   └── config.toml
/// ├── data/
/// ├── cache/
/// ├── snapshots/
/// └── stages/          (demo only)
///     ├── idle.sh
///     ├── user_input.sh
///     ├── detection.sh
///     ├── photo.sh
///     └── review.sh
/// ```
///
/// The data directories are taken from the written configuration, so the
/// layout always matches what `photobooth run` will use.
///
/// # Errors
/// - `ConfigExists` if `.photobooth/config.toml` exists and `force` is unset
/// - `TemplateNotFound`, `DirectoryCreate` or `FileWrite` on scaffolding failures
/// - `Config` if the written configuration does not load
pub async fn init_project(options: InitOptions) -> InitResult<PathBuf> {
    let root = &options.target_dir;
    let config_file = config_path(root);

    if config_file.exists() && !options.force {
        return Err(InitError::ConfigExists(config_file));
    }

    let template = if options.demo {
        DEMO_CONFIG_TEMPLATE
    } else {
        CONFIG_TEMPLATE
    };
    write_template_file(template, &config_file)?;

    if options.demo {
        for path in list_templates(&format!("{DEMO_PREFIX}stages/")) {
            let relative = path.strip_prefix(DEMO_PREFIX).unwrap_or(&path);
            write_template_file(&path, &root.join(relative))?;
        }
    }

    let config = load_config(root).await?;
    ensure_directories(&config)?;

    Ok(config_file)
}

/// Write the embedded `template` to `target`, creating parent directories.
fn write_template_file(template: &str, target: &Path) -> InitResult<()> {
    let content =
        get_template(template).ok_or_else(|| InitError::TemplateNotFound(template.to_string()))?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| InitError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(target, content).map_err(|source| InitError::FileWrite {
        path: target.to_path_buf(),
        source,
    })
}

//! Configuration loading and management.
//!
//! This module loads `.photobooth/config.toml`, resolves its relative paths
//! against the project root and validates the result.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{config_path, ensure_directories, load_config, CONFIG_DIR, CONFIG_FILE};

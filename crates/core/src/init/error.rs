//! Error types for `photobooth init`.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

pub type InitResult<T> = Result<T, InitError>;

#[derive(Debug, Error)]
pub enum InitError {
    /// A configuration file is already present and `force` was not set.
    #[error("configuration already exists at {0:?}. Use --force to overwrite.")]
    ConfigExists(PathBuf),

    #[error("Template file not found: {0}")]
    TemplateNotFound(String),

    #[error("Failed to create directory {path:?}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path:?}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The freshly written configuration did not load.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

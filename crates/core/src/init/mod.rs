//! Scaffolding for a new kiosk project.
//!
//! Writes `.photobooth/config.toml` from an embedded template and creates the
//! data, cache and snapshot directories. The demo variant also writes shell
//! stand-ins for every stage program.
//!
//! # Example
//!
//! ```no_run
//! use pb_core::init::{init_project, InitOptions};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = InitOptions {
//!     target_dir: PathBuf::from("."),
//!     force: false,
//!     demo: false,
//! };
//!
//! let config_path = init_project(options).await?;
//! println!("Wrote {}", config_path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod templates;

pub use error::{InitError, InitResult};
pub use generator::{init_project, InitOptions};
pub use templates::{get_template, list_templates};

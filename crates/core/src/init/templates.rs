//! Embedded files written by `photobooth init`.
//!
//! The workspace `templates/` directory is compiled into the binary with
//! `rust-embed`, so initialization needs nothing from the filesystem.

use rust_embed::RustEmbed;

/// Files under the workspace `templates/` directory.
///
/// `CARGO_MANIFEST_DIR` is `crates/core`, so `../../templates` is the
/// workspace root's `templates/`.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../templates"]
pub struct TemplateAssets;

/// Template content by path relative to `templates/`.
///
/// # Example
/// ```
/// use pb_core::init::templates::get_template;
///
/// let config = get_template("config.toml").expect("config.toml should exist");
/// assert!(config.contains("[stages.photo]"));
/// ```
pub fn get_template(path: &str) -> Option<String> {
    TemplateAssets::get(path).map(|file| String::from_utf8_lossy(file.data.as_ref()).to_string())
}

/// Template paths starting with `prefix`, sorted.
pub fn list_templates(prefix: &str) -> Vec<String> {
    let mut paths: Vec<String> = TemplateAssets::iter()
        .filter(|path| path.starts_with(prefix))
        .map(|path| path.to_string())
        .collect();
    paths.sort();
    paths
}

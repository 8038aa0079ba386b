//! Shared helpers for the core integration tests.
//!
//! - Stage projects backed by small `sh` scripts
//! - Event queue helpers with timeouts

pub mod events;
pub mod fixtures;

#[allow(unused_imports)]
pub use events::*;
pub use fixtures::*;

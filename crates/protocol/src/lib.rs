//! # pb-protocol
//!
//! Core protocol definitions and data models for the photobooth orchestrator.
//!
//! This crate defines all shared data structures used for:
//! - Configuration file parsing (`.photobooth/config.toml`)
//! - The per-visit session record and its partial (merge) form
//! - The event queue consumed by the orchestrator
//!
//! ## Modules
//!
//! - [`config_models`]: Kiosk configuration structures
//! - [`session_models`]: Session record and merge patches
//! - [`stage_models`]: Stage identifiers, kiosk states, override commands
//! - [`ipc`]: Events posted onto the orchestrator queue
//!
//! ## Design Principles
//!
//! - Minimal dependencies: only serde, uuid and tokio's sync types
//! - Independent compilation: no dependencies on other photobooth crates

pub mod config_models;
pub mod ipc;
pub mod session_models;
pub mod stage_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use session_models::*;
pub use stage_models::*;

/// Sending half of the orchestrator event queue.
pub type EventSender = tokio::sync::mpsc::Sender<Event>;

/// Receiving half of the orchestrator event queue.
pub type EventReceiver = tokio::sync::mpsc::Receiver<Event>;

/// Capacity of the orchestrator event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Create the orchestrator event queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::channel(EVENT_QUEUE_CAPACITY)
}

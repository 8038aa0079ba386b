//! # pb-core
//!
//! Orchestration engine for the photobooth kiosk.
//!
//! This crate provides:
//! - Configuration loading from the `.photobooth/` directory
//! - The kiosk state machine and its stage supervision
//! - Session record storage shared with the stage programs
//! - GPIO and console trigger sources
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`hardware`]: Motion sensor, capture button, indicator and console overrides
//! - [`init`]: `photobooth init` scaffolding
//! - [`kiosk`]: Runtime wiring for `photobooth run`
//! - [`orchestrator`]: The state machine
//! - [`parser`]: Stage output line protocol
//! - [`session`]: Temp, permanent and artifact session files
//! - [`supervisor`]: Stage program launch and termination

pub mod config;
pub mod hardware;
pub mod init;
pub mod kiosk;
pub mod orchestrator;
pub mod parser;
pub mod session;
pub mod signals;
pub mod supervisor;

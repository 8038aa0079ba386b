//! Hardware triggers and the status indicator.
//!
//! The kiosk reacts to two digital inputs (a motion sensor and a capture
//! button) and drives one output (the status indicator). On hosts without
//! usable GPIO the kiosk keeps running in override-only mode, where only
//! console commands produce trigger events.
//!
//! ## Modules
//!
//! - [`debounce`]: edge detection and debouncing of sampled levels
//! - [`gpio`]: sysfs GPIO backend
//! - [`console`]: manual override commands read from a text stream

pub mod console;
pub mod debounce;
pub mod error;
pub mod gpio;

pub use error::{HardwareError, HardwareResult};

use pb_protocol::config_models::HardwareConfig;
use pb_protocol::EventSender;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Drives the status indicator.
///
/// Implementations swallow their own failures; the flow never depends on
/// the indicator working.
pub trait Indicator: Send + Sync + std::fmt::Debug {
    fn set_indicator(&self, on: bool);
}

/// Indicator used in override-only mode.
#[derive(Debug, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set_indicator(&self, _on: bool) {}
}

/// Whether hardware triggers are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareMode {
    Gpio,
    OverrideOnly,
}

/// The running hardware event source.
#[derive(Debug)]
pub struct HardwareEventSource {
    mode: HardwareMode,
    indicator: Arc<dyn Indicator>,
    monitor: Option<JoinHandle<()>>,
}

impl HardwareEventSource {
    /// Bring up the inputs and start posting trigger events to `tx`.
    ///
    /// Never fails: if hardware is disabled or cannot be initialised, a
    /// diagnostic is logged and the source runs in override-only mode.
    pub fn start(config: &HardwareConfig, tx: EventSender) -> Self {
        if !config.enabled {
            info!("Hardware disabled in configuration, running override-only");
            return Self::override_only();
        }

        match gpio::open(config) {
            Ok(indicator) => {
                let monitor = gpio::spawn_input_monitor(config, tx);
                Self {
                    mode: HardwareMode::Gpio,
                    indicator: Arc::new(indicator),
                    monitor: Some(monitor),
                }
            }
            Err(err) => {
                warn!(error = %err, "Hardware unavailable, running override-only");
                Self::override_only()
            }
        }
    }

    pub fn override_only() -> Self {
        Self {
            mode: HardwareMode::OverrideOnly,
            indicator: Arc::new(NoIndicator),
            monitor: None,
        }
    }

    pub fn mode(&self) -> HardwareMode {
        self.mode
    }

    /// Shared handle for the orchestrator.
    pub fn indicator(&self) -> Arc<dyn Indicator> {
        Arc::clone(&self.indicator)
    }

    /// Stop polling and switch the indicator off.
    pub fn stop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        self.indicator.set_indicator(false);
    }
}

impl Drop for HardwareEventSource {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
    }
}

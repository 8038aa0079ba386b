//! Edge detection and debouncing for polled digital inputs.

use std::time::Duration;
use std::time::Instant;

/// Which level change on an input counts as a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low to high (motion sensor).
    Rising,
    /// High to low (pull-up button).
    Falling,
}

/// Suppresses transitions that follow an accepted one within `window`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Whether a transition at `now` is surfaced. Accepted transitions open
    /// a new window; suppressed ones do not extend it.
    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}

/// Turns a stream of sampled levels into debounced trigger edges.
#[derive(Debug, Clone)]
pub struct InputMonitor {
    edge: Edge,
    level: Option<bool>,
    debouncer: Debouncer,
}

impl InputMonitor {
    pub fn new(edge: Edge, window: Duration) -> Self {
        Self {
            edge,
            level: None,
            debouncer: Debouncer::new(window),
        }
    }

    /// Feed one sample. Returns true when it completes a trigger edge that
    /// survives debouncing.
    ///
    /// The first sample only establishes the baseline level.
    pub fn observe(&mut self, level: bool, now: Instant) -> bool {
        let previous = self.level.replace(level);
        let Some(previous) = previous else {
            return false;
        };

        let triggered = match self.edge {
            Edge::Rising => !previous && level,
            Edge::Falling => previous && !level,
        };

        triggered && self.debouncer.accept(now)
    }
}

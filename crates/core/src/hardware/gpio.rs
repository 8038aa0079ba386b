//! Linux sysfs GPIO backend.
//!
//! Pins are exported through `<gpio_root>/export`, configured through
//! `gpioN/direction` and sampled by polling `gpioN/value`.

use crate::hardware::debounce::{Edge, InputMonitor};
use crate::hardware::error::{HardwareError, HardwareResult};
use crate::hardware::Indicator;
use pb_protocol::config_models::HardwareConfig;
use pb_protocol::ipc::Event;
use pb_protocol::EventSender;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Direction of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// Handle on the sysfs GPIO tree.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    /// Export `pin` and set its direction. Already exported pins are reused.
    pub fn setup(&self, pin: u32, direction: Direction) -> HardwareResult<()> {
        if !self.root.is_dir() {
            return Err(HardwareError::Unavailable {
                reason: format!("{} does not exist", self.root.display()),
            });
        }

        if !self.pin_dir(pin).exists() {
            write_attr(&self.root.join("export"), &pin.to_string())?;
        }

        write_attr(
            &self.pin_dir(pin).join("direction"),
            direction.as_str(),
        )
    }

    pub fn read(&self, pin: u32) -> HardwareResult<bool> {
        let path = self.pin_dir(pin).join("value");
        let value = std::fs::read_to_string(&path)
            .map_err(|source| HardwareError::Io { path, source })?;
        Ok(value.trim() == "1")
    }

    /// [`read`](Self::read) off the async worker threads, for the poll loop.
    pub async fn read_async(&self, pin: u32) -> HardwareResult<bool> {
        let path = self.pin_dir(pin).join("value");
        let value = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| HardwareError::Io { path, source })?;
        Ok(value.trim() == "1")
    }

    pub fn write(&self, pin: u32, high: bool) -> HardwareResult<()> {
        write_attr(
            &self.pin_dir(pin).join("value"),
            if high { "1" } else { "0" },
        )
    }
}

fn write_attr(path: &Path, value: &str) -> HardwareResult<()> {
    std::fs::write(path, value).map_err(|source| HardwareError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// The status indicator wired to an output pin.
#[derive(Debug)]
pub struct GpioIndicator {
    gpio: SysfsGpio,
    pin: u32,
}

impl Indicator for GpioIndicator {
    fn set_indicator(&self, on: bool) {
        if let Err(err) = self.gpio.write(self.pin, on) {
            debug!(pin = self.pin, on, error = %err, "Failed to drive indicator");
        }
    }
}

/// Configure the input and output pins named in `config`.
///
/// Returns the indicator handle; the inputs are left ready for
/// [`spawn_input_monitor`].
pub fn open(config: &HardwareConfig) -> HardwareResult<GpioIndicator> {
    let gpio = SysfsGpio::new(&config.gpio_root);

    gpio.setup(config.motion_pin, Direction::In)?;
    gpio.setup(config.button_pin, Direction::In)?;
    gpio.setup(config.indicator_pin, Direction::Out)?;
    gpio.write(config.indicator_pin, false)?;

    // Fail now rather than in the poll loop if the inputs are unreadable.
    gpio.read(config.motion_pin)?;
    gpio.read(config.button_pin)?;

    info!(
        root = %config.gpio_root.display(),
        motion_pin = config.motion_pin,
        button_pin = config.button_pin,
        indicator_pin = config.indicator_pin,
        "GPIO ready"
    );

    Ok(GpioIndicator {
        gpio,
        pin: config.indicator_pin,
    })
}

/// Poll the motion and button inputs and post debounced trigger events.
///
/// The task ends when the event queue closes or an input stops being
/// readable.
pub fn spawn_input_monitor(config: &HardwareConfig, tx: EventSender) -> JoinHandle<()> {
    let gpio = SysfsGpio::new(&config.gpio_root);
    let motion_pin = config.motion_pin;
    let button_pin = config.button_pin;
    let mut motion = InputMonitor::new(Edge::Rising, config.debounce_window());
    let mut button = InputMonitor::new(Edge::Falling, config.debounce_window());
    let poll_interval = config.poll_interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = Instant::now();

            let levels = match gpio.read_async(motion_pin).await {
                Ok(motion_level) => gpio
                    .read_async(button_pin)
                    .await
                    .map(|button_level| (motion_level, button_level)),
                Err(err) => Err(err),
            };
            let (motion_level, button_level) = match levels {
                Ok(levels) => levels,
                Err(err) => {
                    warn!(error = %err, "GPIO input lost, hardware triggers disabled");
                    return;
                }
            };

            let mut events = Vec::new();
            if motion.observe(motion_level, now) {
                debug!(pin = motion_pin, "Motion detected");
                events.push(Event::HardwareMotion);
            }
            if button.observe(button_level, now) {
                debug!(pin = button_pin, "Button pressed");
                events.push(Event::HardwareButton);
            }

            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    })
}

//! Push-button handling.
//!
//! The button sits on one GPIO line, pulled up and shorted to ground when
//! pressed (active low). The controller samples it once per tick and feeds
//! the level into [`ButtonMonitor`], which turns it into at most one
//! [`ButtonEvent`] per sample:
//!
//! - releasing after a short press advances the playback mode;
//! - holding past `hold_to_shutdown` requests shutdown while still held.
//!
//! Once a hold has requested shutdown, the matching release is swallowed.

use std::path::Path;
use std::time::{Duration, Instant};

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

impl Level {
    /// Pressed means pulled to ground.
    pub fn is_pressed(self) -> bool {
        self == Level::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ModeAdvance,
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy)]
pub struct Durations {
    pub debounce: Duration,
    pub hold_to_shutdown: Duration,
}

/// A digital input the controller can poll.
pub trait InputLine {
    fn read_level(&mut self) -> Result<Level>;

    /// Give the line back to the kernel. Reading afterwards is a hardware fault.
    fn release(&mut self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ButtonState {
    pub raw_level: Level,
    pub debounced_level: Level,
    /// Armed while the button is held down after a press seen by the monitor.
    /// A button already held at startup leaves this `None` until released.
    pub press_deadline: Option<Instant>,
    /// The current hold has already produced its outcome.
    release_suppressed: bool,
    last_transition: Option<Instant>,
}

pub struct ButtonMonitor {
    durations: Durations,
    state: ButtonState,
}

impl ButtonMonitor {
    /// Start from the level read at startup.
    ///
    /// A button that is already down at startup is ignored until it has
    /// been released once.
    pub fn new(durations: Durations, initial: Level) -> Self {
        Self {
            durations,
            state: ButtonState {
                raw_level: initial,
                debounced_level: initial,
                press_deadline: None,
                release_suppressed: initial.is_pressed(),
                last_transition: None,
            },
        }
    }

    pub fn state(&self) -> &ButtonState {
        &self.state
    }

    pub fn is_pressed(&self) -> bool {
        self.state.debounced_level.is_pressed()
    }

    pub fn sample(&mut self, level: Level, now: Instant) -> Option<ButtonEvent> {
        self.state.raw_level = level;

        if level != self.state.debounced_level && self.accept(now) {
            self.state.debounced_level = level;
            if level.is_pressed() {
                debug!("button pressed");
                self.state.press_deadline = Some(now + self.durations.hold_to_shutdown);
                self.state.release_suppressed = false;
                return None;
            }

            self.state.press_deadline = None;
            if std::mem::take(&mut self.state.release_suppressed) {
                debug!("button released after completed hold; ignored");
                return None;
            }
            info!("short press → mode advance");
            return Some(ButtonEvent::ModeAdvance);
        }

        match self.state.press_deadline {
            Some(deadline) if !self.state.release_suppressed && now >= deadline => {
                info!(
                    held = ?self.durations.hold_to_shutdown,
                    "long press → shutdown"
                );
                self.state.release_suppressed = true;
                Some(ButtonEvent::ShutdownRequested)
            }
            _ => None,
        }
    }

    fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.state.last_transition
            && now.saturating_duration_since(last) < self.durations.debounce
        {
            debug!("debounced transition");
            return false;
        }
        self.state.last_transition = Some(now);
        true
    }
}

/// Button line on a Linux GPIO character device.
///
/// The kernel ABI used here cannot set bias; the pull-up is expected from
/// the board or device tree.
pub struct GpioLine {
    handle: Option<LineHandle>,
    offset: u32,
}

impl GpioLine {
    const CONSUMER: &'static str = "eink-frame-button";

    pub fn open(chip_path: &Path, offset: u32) -> Result<Self> {
        let mut chip = Chip::new(chip_path).map_err(|err| {
            Error::Hardware(format!("failed to open {}: {err}", chip_path.display()))
        })?;
        let handle = chip
            .get_line(offset)
            .and_then(|line| line.request(LineRequestFlags::INPUT, 0, Self::CONSUMER))
            .map_err(|err| Error::Hardware(format!("failed to request line {offset}: {err}")))?;
        info!(line = offset, "button line requested");
        Ok(Self {
            handle: Some(handle),
            offset,
        })
    }
}

impl InputLine for GpioLine {
    fn read_level(&mut self) -> Result<Level> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::Hardware(format!("line {} already released", self.offset)))?;
        let value = handle
            .get_value()
            .map_err(|err| Error::Hardware(format!("failed to read line {}: {err}", self.offset)))?;
        Ok(if value == 0 { Level::Low } else { Level::High })
    }

    fn release(&mut self) -> Result<()> {
        if self.handle.take().is_some() {
            debug!(line = self.offset, "button line released");
        }
        Ok(())
    }
}

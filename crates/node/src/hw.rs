//! Hardware seams for the controller. The control logic only talks to these
//! traits; the `gpio` feature gates the real rppal outputs, and without it a
//! mock implementation logs state changes instead.

use anyhow::Result;
use std::time::Duration;

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

#[cfg(not(feature = "gpio"))]
use std::{cell::Cell, rc::Rc};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Monotonic millisecond counter plus the one way the controller suspends.
///
/// `now_ms` wraps after ~49 days; callers compare timestamps with
/// [`crate::scheduler::is_due`], never with `<`.
pub(crate) trait Clock {
    fn now_ms(&self) -> u32;
    async fn sleep_ms(&self, ms: u32);
}

/// One analog moisture sample. Higher readings mean drier soil.
pub(crate) trait SensorReader {
    fn read(&mut self) -> Result<u16>;
}

/// Active-high digital output (pump relay, activity LED).
pub(crate) trait DigitalOutput {
    fn set(&mut self, on: bool);
}

/// Response of a completed HTTP exchange, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HttpResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

/// Transport to the coordination endpoint.
pub(crate) trait NetworkTransport {
    /// Whether the network path to the endpoint is currently usable.
    async fn link_up(&mut self) -> bool;
    /// Issue a single GET. `Err` means no HTTP response was obtained.
    async fn get(&mut self, url: &reqwest::Url) -> Result<HttpResponse>;
}

// ---------------------------------------------------------------------------
// Clock backed by tokio's timer
// ---------------------------------------------------------------------------

pub(crate) struct TokioClock {
    booted_at: tokio::time::Instant,
}

impl TokioClock {
    pub(crate) fn new() -> Self {
        Self {
            booted_at: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wraparound.
        self.booted_at.elapsed().as_millis() as u32
    }

    async fn sleep_ms(&self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
    }
}

// ---------------------------------------------------------------------------
// Real GPIO output (production, requires rppal + Raspberry Pi hardware)
// ---------------------------------------------------------------------------
#[cfg(feature = "gpio")]
pub(crate) struct GpioOutput {
    name: &'static str,
    pin: OutputPin,
}

#[cfg(feature = "gpio")]
impl GpioOutput {
    pub(crate) fn new(gpio: &Gpio, name: &'static str, pin_num: u8) -> Result<Self> {
        // Fail-safe: start de-energized.
        let pin = gpio.get(pin_num)?.into_output_low();
        tracing::info!(output = name, gpio = pin_num, "output initialised (off)");
        Ok(Self { name, pin })
    }
}

#[cfg(feature = "gpio")]
impl DigitalOutput for GpioOutput {
    fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        tracing::debug!(output = self.name, on, "gpio set");
    }
}

// ---------------------------------------------------------------------------
// Mock output (development, no hardware, logs state)
// ---------------------------------------------------------------------------
#[cfg(not(feature = "gpio"))]
pub(crate) struct MockOutput {
    name: &'static str,
    level: Rc<Cell<bool>>,
}

#[cfg(not(feature = "gpio"))]
impl MockOutput {
    pub(crate) fn new(name: &'static str, pin_num: u8) -> Self {
        tracing::info!(output = name, gpio = pin_num, "[mock-gpio] registered (not wired)");
        Self {
            name,
            level: Rc::new(Cell::new(false)),
        }
    }

    /// Shared view of the output level, e.g. for the sensor simulator.
    pub(crate) fn probe(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.level)
    }
}

#[cfg(not(feature = "gpio"))]
impl DigitalOutput for MockOutput {
    fn set(&mut self, on: bool) {
        if self.level.replace(on) != on {
            tracing::debug!(
                output = self.name,
                "[mock-gpio] set {}",
                if on { "ON" } else { "OFF" }
            );
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Stateful soil moisture simulator for local development.
//!
//! Models a capacitive probe on a potted plant:
//! - Temporal coherence via random walk with mean reversion
//! - Gradual drying drift (evaporation)
//! - Per-reading ADC noise and occasional spikes
//! - Closed-loop watering response while the pump relay is on

use anyhow::Result;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::hw::SensorReader;

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Simulation profiles selectable via `[sim] scenario`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scenario {
    /// Starts mid-range, steady drift toward dry. Waters regularly.
    Drying,
    /// Hovers near the centre with low noise.
    Stable,
    /// Starts near the wet end and dries very slowly.
    Wet,
}

impl Scenario {
    pub(crate) fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "stable" => Self::Stable,
            "wet" => Self::Wet,
            _ => Self::Drying,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drying => write!(f, "drying"),
            Self::Stable => write!(f, "stable"),
            Self::Wet => write!(f, "wet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Produces readings in `0..=sensor_max`; higher is drier.
pub(crate) struct SoilMoistureSim {
    /// Current "true" soil state in ADC units.
    base: f64,
    sensor_max: f64,
    raw_wet: f64,
    raw_dry: f64,

    drift_per_sample: f64,
    walk_sigma: f64,
    mean_reversion: f64,
    noise_sigma: f64,
    spike_prob: f32,

    /// Relay level; `None` when the pump is real hardware.
    pump: Option<Rc<Cell<bool>>>,
    wet_per_sample: f64,
}

impl SoilMoistureSim {
    pub(crate) fn new(scenario: Scenario, sensor_max: u16, pump: Option<Rc<Cell<bool>>>) -> Self {
        let sensor_max = f64::from(sensor_max);
        let raw_wet = sensor_max * 0.35;
        let raw_dry = sensor_max * 0.85;
        let range = raw_dry - raw_wet;

        // Fractions of the wet..dry range, per sample.
        let (drift, walk, mean_rev, noise, spike_prob, start_frac) = match scenario {
            Scenario::Drying => (0.01, 0.01, 0.01, 0.006, 0.03_f32, 0.5),
            Scenario::Stable => (0.0015, 0.004, 0.05, 0.003, 0.005, 0.5),
            Scenario::Wet => (0.002, 0.006, 0.02, 0.004, 0.02, 0.15),
        };

        Self {
            base: raw_wet + start_frac * range,
            sensor_max,
            raw_wet,
            raw_dry,
            drift_per_sample: drift * range,
            walk_sigma: walk * range,
            mean_reversion: mean_rev,
            noise_sigma: noise * range,
            spike_prob,
            pump,
            wet_per_sample: -0.15 * range,
        }
    }

    fn watering(&self) -> bool {
        self.pump.as_ref().is_some_and(|p| p.get())
    }

    /// Evolve the soil state and return the next reading.
    pub(crate) fn sample(&mut self) -> u16 {
        let center = (self.raw_dry + self.raw_wet) / 2.0;
        let pull = self.mean_reversion * (center - self.base);
        let walk = gaussian(0.0, self.walk_sigma);
        let wet = if self.watering() { self.wet_per_sample } else { 0.0 };

        self.base = (self.base + self.drift_per_sample + pull + walk + wet)
            .clamp(self.raw_wet * 0.9, self.raw_dry * 1.05);

        let noise = gaussian(0.0, self.noise_sigma);
        let spike = if fastrand::f32() < self.spike_prob {
            gaussian(0.0, self.noise_sigma * 10.0)
        } else {
            0.0
        };

        (self.base + noise + spike)
            .round()
            .clamp(0.0, self.sensor_max) as u16
    }
}

impl SensorReader for SoilMoistureSim {
    fn read(&mut self) -> Result<u16> {
        Ok(self.sample())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

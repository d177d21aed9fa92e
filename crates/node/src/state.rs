use crate::config::Settings;
use crate::scheduler::Deadline;

// ---------------------------------------------------------------------------
// Dryness threshold
// ---------------------------------------------------------------------------

/// Dryness threshold adjustable in fixed steps inside
/// `[step, upper_bound - step]`.
///
/// An adjustment is applied only when its result stays inside the range;
/// otherwise it is silently ignored. The initial value is taken as
/// configured, even when it already lies outside the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Threshold {
    value: u16,
    step: u16,
    upper_bound: u16,
}

impl Threshold {
    pub(crate) fn new(value: u16, step: u16, upper_bound: u16) -> Self {
        Self {
            value,
            step,
            upper_bound,
        }
    }

    pub(crate) fn value(&self) -> u16 {
        self.value
    }

    pub(crate) fn step(&self) -> u16 {
        self.step
    }

    /// Whether the current value lies inside the adjustable range.
    pub(crate) fn in_range(&self) -> bool {
        (self.step..=self.upper_bound.saturating_sub(self.step)).contains(&self.value)
    }

    /// Raise by one step. Returns false when the bound blocks the change.
    pub(crate) fn increase(&mut self) -> bool {
        let ceiling = self.upper_bound.saturating_sub(self.step);
        match self.value.checked_add(self.step) {
            Some(next) if next <= ceiling => {
                self.value = next;
                true
            }
            _ => false,
        }
    }

    /// Lower by one step. Returns false when the bound blocks the change.
    pub(crate) fn decrease(&mut self) -> bool {
        match self.value.checked_sub(self.step) {
            Some(next) if next >= self.step => {
                self.value = next;
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Device state
// ---------------------------------------------------------------------------

/// Everything the controller mutates at runtime. Lives from boot to reset;
/// passed by reference into every component call.
#[derive(Debug, Clone)]
pub(crate) struct DeviceState {
    pub(crate) auto_watering: bool,
    pub(crate) threshold: Threshold,
    pub(crate) next_poll: Deadline,
    pub(crate) next_measurement: Deadline,
}

impl DeviceState {
    /// Boot state: auto-watering on, configured threshold, both deadlines
    /// shortly after `now`.
    pub(crate) fn new(settings: &Settings, now: u32) -> Self {
        let t = &settings.threshold;
        let delay = settings.schedule.startup_delay_ms;
        Self {
            auto_watering: true,
            threshold: Threshold::new(t.default, t.step, t.sensor_max),
            next_poll: Deadline::starting_in(now, delay),
            next_measurement: Deadline::starting_in(now, delay),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Recurring deadlines on a wrapping millisecond counter.
//!
//! Two independent deadlines drive the control loop: the command poll and
//! the moisture measurement. A deadline fires once `now` has reached it and
//! is then pushed to `now + interval`; missed cycles are not made up.

/// True when `now` is at or past `deadline`.
///
/// Uses the signed distance between the two so the comparison stays correct
/// across the `u32` counter wrapping to zero.
pub(crate) fn is_due(deadline: u32, now: u32) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

/// A single "next due at" timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deadline {
    due_at: u32,
}

impl Deadline {
    /// First firing `delay_ms` after `now`.
    pub(crate) fn starting_in(now: u32, delay_ms: u32) -> Self {
        Self {
            due_at: now.wrapping_add(delay_ms),
        }
    }

    pub(crate) fn due_at(&self) -> u32 {
        self.due_at
    }

    pub(crate) fn is_due(&self, now: u32) -> bool {
        is_due(self.due_at, now)
    }

    /// If due, reschedule to `now + interval_ms` and return true.
    pub(crate) fn fire(&mut self, now: u32, interval_ms: u32) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.due_at = now.wrapping_add(interval_ms);
        true
    }
}

// ===========================================================================
// Tests
// ===========================================================================

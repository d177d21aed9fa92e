//! Pump actuation.
//!
//! Automatic watering re-checks the soil while the pump runs and stops as
//! soon as it reads wet. The relay is switched off before either entry point
//! returns, on every path.

use anyhow::Result;
use tracing::{error, info};

use crate::config::SafetyWait;
use crate::hw::{Clock, DigitalOutput, NetworkTransport, SensorReader};
use crate::logger::LogKind;
use crate::node::Node;
use crate::state::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WateringOutcome {
    /// Ran for the whole configured time.
    Completed,
    /// Auto-watering is off; the pump was not touched.
    SkippedPaused,
    /// A re-check found the soil wet.
    StoppedEarly,
}

impl<C, S, O, T> Node<C, S, O, T>
where
    C: Clock,
    S: SensorReader,
    O: DigitalOutput,
    T: NetworkTransport,
{
    /// Water until the configured time is used up or the soil reads wet.
    pub(crate) async fn do_water(&mut self, state: &DeviceState) -> Result<WateringOutcome> {
        if !state.auto_watering {
            info!("automatic watering paused, skipping");
            self.log(LogKind::Message, "Automatic watering is paused, skipping")
                .await;
            return Ok(WateringOutcome::SkippedPaused);
        }

        let duration_ms = self.settings.watering.duration_ms;
        info!(duration_ms, "watering started");
        self.log(LogKind::Command, format!("Watering {}s", duration_ms / 1000))
            .await;

        self.relay.set(true);
        let result = self.water_while_dry(state.threshold.value()).await;
        self.relay.set(false);

        match &result {
            Ok(WateringOutcome::StoppedEarly) => {
                info!("watering stopped early, soil is wet");
                self.log(LogKind::Action, "Watering stopped early, soil is wet")
                    .await;
            }
            Ok(_) => {
                info!("watering finished");
                self.log(LogKind::Action, "Watering finished").await;
            }
            Err(e) => error!("watering aborted, pump off: {e:#}"),
        }
        result
    }

    /// The re-check loop. Caller owns the relay.
    async fn water_while_dry(&mut self, threshold: u16) -> Result<WateringOutcome> {
        let watering = &self.settings.watering;
        let (step, mode) = (i64::from(watering.recheck_step_ms), watering.safety_wait);
        let mut remaining = i64::from(watering.duration_ms);

        loop {
            if self.read_moisture().await? <= threshold {
                return Ok(WateringOutcome::StoppedEarly);
            }

            let wait = match mode {
                SafetyWait::Remaining => remaining,
                SafetyWait::Slice => remaining.min(step),
            };
            self.clock.sleep_ms(wait as u32).await;

            remaining -= step;
            if remaining <= 0 {
                return Ok(WateringOutcome::Completed);
            }
        }
    }

    /// Run the pump for the configured time, unconditionally.
    pub(crate) async fn water_manually(&mut self) {
        let duration_ms = self.settings.watering.duration_ms;
        info!(duration_ms, "manual watering");
        self.log(
            LogKind::Command,
            format!("Watering {}s (manual)", duration_ms / 1000),
        )
        .await;

        self.relay.set(true);
        self.clock.sleep_ms(duration_ms).await;
        self.relay.set(false);
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Remote command codes and their effect on the device state.

use anyhow::Result;
use tracing::info;

use crate::hw::{Clock, DigitalOutput, NetworkTransport, SensorReader};
use crate::logger::LogKind;
use crate::node::Node;
use crate::state::DeviceState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    PauseWatering,
    ResumeWatering,
    ManualWatering,
    ManualMeasurement,
    ThresholdIncrease,
    ThresholdDecrease,
    /// Empty, non-numeric, or unmapped response. No effect.
    Unknown,
}

/// Wire code of every command the endpoint may send.
const COMMAND_CODES: [(i64, Command); 6] = [
    (1, Command::PauseWatering),
    (2, Command::ResumeWatering),
    (3, Command::ManualWatering),
    (4, Command::ManualMeasurement),
    (5, Command::ThresholdIncrease),
    (6, Command::ThresholdDecrease),
];

impl Command {
    pub(crate) fn from_code(code: i64) -> Self {
        COMMAND_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map_or(Self::Unknown, |(_, cmd)| *cmd)
    }

    pub(crate) fn code(self) -> Option<i64> {
        COMMAND_CODES
            .iter()
            .find(|(_, cmd)| *cmd == self)
            .map(|(c, _)| *c)
    }

    /// Decode a poll response body (decimal integer, surrounding whitespace
    /// ignored).
    pub(crate) fn parse(body: &str) -> Self {
        body.trim()
            .parse::<i64>()
            .map_or(Self::Unknown, Self::from_code)
    }
}

impl<C, S, O, T> Node<C, S, O, T>
where
    C: Clock,
    S: SensorReader,
    O: DigitalOutput,
    T: NetworkTransport,
{
    /// Apply one command to `state`.
    pub(crate) async fn execute(&mut self, command: Command, state: &mut DeviceState) -> Result<()> {
        match command {
            Command::PauseWatering => {
                state.auto_watering = false;
                info!("automatic watering paused");
                self.log(LogKind::Command, "Automatic watering paused").await;
            }
            Command::ResumeWatering => {
                state.auto_watering = true;
                info!("automatic watering resumed");
                self.log(LogKind::Command, "Automatic watering resumed").await;
            }
            Command::ManualWatering => self.water_manually().await,
            Command::ManualMeasurement => {
                self.read_moisture().await?;
            }
            Command::ThresholdIncrease => {
                let changed = state.threshold.increase();
                let step = state.threshold.step();
                info!(changed, threshold = state.threshold.value(), "threshold increase");
                self.log(LogKind::Command, format!("Threshold +{step}")).await;
            }
            Command::ThresholdDecrease => {
                let changed = state.threshold.decrease();
                let step = state.threshold.step();
                info!(changed, threshold = state.threshold.value(), "threshold decrease");
                self.log(LogKind::Command, format!("Threshold -{step}")).await;
            }
            Command::Unknown => {}
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

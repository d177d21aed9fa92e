use anyhow::{Context, Result};
use tracing::info;

use crate::hw::{Clock, DigitalOutput, NetworkTransport, SensorReader};
use crate::logger::LogKind;
use crate::node::Node;

impl<C, S, O, T> Node<C, S, O, T>
where
    C: Clock,
    S: SensorReader,
    O: DigitalOutput,
    T: NetworkTransport,
{
    /// Take one moisture sample. Every successful read is also reported as a
    /// Measurement log, whoever the caller is.
    pub(crate) async fn read_moisture(&mut self) -> Result<u16> {
        let raw = self.sensor.read().context("moisture read failed")?;
        info!(raw, "moisture measured");
        self.log(LogKind::Measurement, raw.to_string()).await;
        Ok(raw)
    }
}

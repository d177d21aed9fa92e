//! The cooperative control loop.
//!
//! Each pass checks the two deadlines held in [`DeviceState`]: a due command
//! poll is always serviced before a due measurement. Every suspension (link
//! wait, watering wait, idle) goes through the injected [`Clock`], so nothing
//! else runs while one is in progress.

use anyhow::Result;
use tracing::{debug, error, info};

use crate::command::Command;
use crate::config::Settings;
use crate::hw::{Clock, DigitalOutput, NetworkTransport, SensorReader};
use crate::remote::RemoteClient;
use crate::state::DeviceState;

pub(crate) struct Node<C, S, O, T> {
    pub(crate) clock: C,
    pub(crate) sensor: S,
    pub(crate) relay: O,
    pub(crate) remote: RemoteClient<T, O>,
    pub(crate) settings: Settings,
}

impl<C, S, O, T> Node<C, S, O, T>
where
    C: Clock,
    S: SensorReader,
    O: DigitalOutput,
    T: NetworkTransport,
{
    pub(crate) fn new(
        clock: C,
        sensor: S,
        mut relay: O,
        remote: RemoteClient<T, O>,
        settings: Settings,
    ) -> Self {
        // Fail-safe: pump off at startup.
        relay.set(false);
        Self {
            clock,
            sensor,
            relay,
            remote,
            settings,
        }
    }

    /// Run forever.
    pub(crate) async fn run(&mut self, state: &mut DeviceState) {
        info!(
            device_id = self.settings.device_id,
            poll_ms = self.settings.schedule.poll_interval_ms,
            measure_ms = self.settings.schedule.measure_interval_ms,
            threshold = state.threshold.value(),
            threshold_in_range = state.threshold.in_range(),
            first_run_at = state.next_poll.due_at(),
            "control loop started"
        );
        loop {
            self.run_once(state).await;
        }
    }

    /// One pass of [`run`](Self::run): a failed tick is logged and the loop
    /// carries on after the idle pause.
    pub(crate) async fn run_once(&mut self, state: &mut DeviceState) {
        if let Err(e) = self.tick(state).await {
            error!("control loop iteration failed: {e:#}");
        }
        self.clock.sleep_ms(self.settings.schedule.idle_ms).await;
    }

    /// One loop pass: service a due poll, then a due measurement.
    pub(crate) async fn tick(&mut self, state: &mut DeviceState) -> Result<()> {
        let schedule = &self.settings.schedule;
        let (poll_ms, measure_ms) = (schedule.poll_interval_ms, schedule.measure_interval_ms);

        if state.next_poll.fire(self.clock.now_ms(), poll_ms) {
            let command = self.poll_command().await;
            self.execute(command, state).await?;
        }

        if state.next_measurement.fire(self.clock.now_ms(), measure_ms) {
            let reading = self.read_moisture().await?;
            if reading > state.threshold.value() {
                info!(reading, threshold = state.threshold.value(), "soil is dry");
                self.do_water(state).await?;
            } else {
                debug!(reading, threshold = state.threshold.value(), "soil is moist");
            }
        }

        Ok(())
    }

    /// Ask the endpoint for the next command.
    pub(crate) async fn poll_command(&mut self) -> Command {
        let id = self.settings.device_id.to_string();
        let body = self.remote.request(&self.clock, "request", &id).await;
        let command = Command::parse(&body);
        if command != Command::Unknown {
            info!(?command, code = ?command.code(), "command received");
        } else if !body.trim().is_empty() {
            debug!(body = %body.trim(), "ignoring unmapped command");
        }
        command
    }

    /// De-energize every output. Called on the way out.
    pub(crate) fn shutdown(&mut self) {
        self.relay.set(false);
        self.remote.indicator.set(false);
        info!("outputs off");
    }
}

// ===========================================================================
// Tests
// ===========================================================================

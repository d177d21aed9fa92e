//! In-memory stand-ins for the hardware seams, shared by the unit tests.

use anyhow::{anyhow, Result};
use reqwest::Url;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::config::{Endpoint, SafetyWait, Settings};
use crate::hw::{Clock, DigitalOutput, HttpResponse, NetworkTransport, SensorReader};
use crate::node::Node;
use crate::remote::RemoteClient;
use crate::state::DeviceState;

pub(crate) const DEVICE_ID: u32 = 7;

/// Virtual time: every sleep is recorded and advances `now` instantly.
#[derive(Default)]
pub(crate) struct ManualClock {
    pub(crate) now: Cell<u32>,
    pub(crate) sleeps: RefCell<Vec<u32>>,
}

impl ManualClock {
    pub(crate) fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub(crate) fn total_slept(&self) -> u64 {
        self.sleeps.borrow().iter().map(|&ms| u64::from(ms)).sum()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    async fn sleep_ms(&self, ms: u32) {
        self.sleeps.borrow_mut().push(ms);
        self.advance(ms);
    }
}

/// Returns queued readings in order, then repeats `fallback`.
#[derive(Default)]
pub(crate) struct ScriptedSensor {
    pub(crate) readings: VecDeque<u16>,
    pub(crate) fallback: u16,
    pub(crate) fail: bool,
    pub(crate) reads: usize,
}

impl SensorReader for ScriptedSensor {
    fn read(&mut self) -> Result<u16> {
        self.reads += 1;
        if self.fail {
            return Err(anyhow!("i2c bus error"));
        }
        Ok(self.readings.pop_front().unwrap_or(self.fallback))
    }
}

/// Output that remembers every transition.
#[derive(Default)]
pub(crate) struct RecordingOutput {
    pub(crate) level: bool,
    pub(crate) history: Vec<bool>,
}

impl DigitalOutput for RecordingOutput {
    fn set(&mut self, on: bool) {
        self.level = on;
        self.history.push(on);
    }
}

/// Scripted link state and responses; records every request sent.
#[derive(Default)]
pub(crate) struct FakeTransport {
    /// Successive `link_up` answers; up once exhausted.
    pub(crate) link: VecDeque<bool>,
    pub(crate) link_checks: usize,
    /// Successive `get` results; empty 200 once exhausted.
    pub(crate) responses: VecDeque<Result<HttpResponse>>,
    /// `(action, payload)` of every request, psk stripped.
    pub(crate) sent: Vec<(String, String)>,
}

impl FakeTransport {
    pub(crate) fn with_bodies(bodies: &[&str]) -> Self {
        let mut t = Self::default();
        for body in bodies {
            t.responses.push_back(Ok(HttpResponse {
                status: 200,
                body: body.to_string(),
            }));
        }
        t
    }

    /// Payloads of all `log` requests, in order.
    pub(crate) fn logs(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter(|(action, _)| action == "log")
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Logs whose label is `label`.
    pub(crate) fn logs_labelled(&self, label: &str) -> Vec<String> {
        let prefix = format!("{label},");
        self.logs()
            .into_iter()
            .filter(|l| l.starts_with(&prefix))
            .collect()
    }
}

impl NetworkTransport for FakeTransport {
    async fn link_up(&mut self) -> bool {
        self.link_checks += 1;
        self.link.pop_front().unwrap_or(true)
    }

    async fn get(&mut self, url: &Url) -> Result<HttpResponse> {
        if let Some((action, payload)) = url.query_pairs().find(|(k, _)| k != "psk") {
            self.sent.push((action.into_owned(), payload.into_owned()));
        }
        self.responses.pop_front().unwrap_or_else(|| {
            Ok(HttpResponse {
                status: 200,
                body: String::new(),
            })
        })
    }
}

pub(crate) type TestNode = Node<ManualClock, ScriptedSensor, RecordingOutput, FakeTransport>;

pub(crate) fn test_settings() -> Settings {
    let mut s = Settings::default();
    s.device_id = DEVICE_ID;
    s.endpoint = Endpoint {
        host: "10.0.0.5".into(),
        port: 8080,
        path: "/plant".into(),
        psk: "s3cret".into(),
    };
    s.schedule.poll_interval_ms = 10_000;
    s.schedule.measure_interval_ms = 60_000;
    s.schedule.startup_delay_ms = 1_000;
    s.watering.duration_ms = 10_000;
    s.watering.recheck_step_ms = 5_000;
    s.watering.safety_wait = SafetyWait::Remaining;
    s.threshold.default = 500;
    s.threshold.step = 100;
    s.threshold.sensor_max = 1023;
    s
}

/// Node whose sensor reports `readings` in order, then `fallback`.
pub(crate) fn test_node(settings: Settings, readings: &[u16], fallback: u16) -> TestNode {
    let sensor = ScriptedSensor {
        readings: readings.iter().copied().collect(),
        fallback,
        ..ScriptedSensor::default()
    };
    let remote = RemoteClient::new(
        FakeTransport::default(),
        RecordingOutput::default(),
        settings.endpoint.clone(),
        settings.network.connect_backoff_ms,
    );
    Node::new(
        ManualClock::default(),
        sensor,
        RecordingOutput::default(),
        remote,
        settings,
    )
}

pub(crate) fn test_state(node: &TestNode) -> DeviceState {
    DeviceState::new(&node.settings, node.clock.now_ms())
}

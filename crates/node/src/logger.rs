//! Remote log records, submitted through the endpoint's `log` action.

use std::fmt;
use tracing::debug;

use crate::hw::{Clock, DigitalOutput, NetworkTransport, SensorReader};
use crate::node::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogKind {
    Measurement,
    Action,
    Command,
    Message,
}

impl LogKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Measurement => "MEASUREMENT",
            Self::Action => "ACTION",
            Self::Command => "COMMAND",
            Self::Message => "MESSAGE",
        }
    }
}

/// One record, rendered as `LABEL,deviceId,message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogEntry<'a> {
    pub(crate) kind: LogKind,
    pub(crate) device_id: u32,
    pub(crate) message: &'a str,
}

impl fmt::Display for LogEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.kind.label(), self.device_id, self.message)
    }
}

impl<C, S, O, T> Node<C, S, O, T>
where
    C: Clock,
    S: SensorReader,
    O: DigitalOutput,
    T: NetworkTransport,
{
    /// Send a log record. Fire-and-forget: the response is discarded and
    /// nothing is queued or retried.
    pub(crate) async fn log(&mut self, kind: LogKind, message: impl AsRef<str>) {
        let payload = LogEntry {
            kind,
            device_id: self.settings.device_id,
            message: message.as_ref(),
        }
        .to_string();
        debug!(%payload, "remote log");
        self.remote.request(&self.clock, "log", &payload).await;
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! TOML settings loading, environment overrides, and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Settings structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) device_id: u32,
    pub(crate) endpoint: Endpoint,
    pub(crate) schedule: Schedule,
    pub(crate) watering: Watering,
    pub(crate) threshold: ThresholdSettings,
    pub(crate) pins: Pins,
    pub(crate) network: Network,
    pub(crate) sim: Sim,
}

/// Coordination endpoint: `http://{host}:{port}{path}?psk={psk}&...`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Endpoint {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) path: String,
    pub(crate) psk: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Schedule {
    pub(crate) poll_interval_ms: u32,
    pub(crate) measure_interval_ms: u32,
    /// Delay before the first poll and first measurement after boot.
    pub(crate) startup_delay_ms: u32,
    /// Pause between loop iterations.
    pub(crate) idle_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Watering {
    pub(crate) duration_ms: u32,
    /// Amount the remaining watering time shrinks per dryness re-check.
    pub(crate) recheck_step_ms: u32,
    pub(crate) safety_wait: SafetyWait,
}

/// How long each iteration of the watering loop suspends before the next
/// dryness re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SafetyWait {
    /// The whole remaining time, then shrink remaining by one step.
    Remaining,
    /// One step (or less, at the end), re-checking in between.
    Slice,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ThresholdSettings {
    pub(crate) default: u16,
    pub(crate) step: u16,
    /// Largest reading the sensor can report; upper clamp bound.
    pub(crate) sensor_max: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Pins {
    pub(crate) relay: u8,
    pub(crate) indicator: u8,
    pub(crate) adc_channel: u8,
    pub(crate) adc_address: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Network {
    pub(crate) connect_backoff_ms: u32,
    pub(crate) probe_timeout_ms: u32,
    pub(crate) request_timeout_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Sim {
    pub(crate) scenario: String,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_id: 1,
            endpoint: Endpoint::default(),
            schedule: Schedule::default(),
            watering: Watering::default(),
            threshold: ThresholdSettings::default(),
            pins: Pins::default(),
            network: Network::default(),
            sim: Sim::default(),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "192.168.1.10".to_string(),
            port: 80,
            path: "/plant".to_string(),
            psk: "changeme".to_string(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            measure_interval_ms: 30 * 60 * 1000,
            startup_delay_ms: 2_000,
            idle_ms: 100,
        }
    }
}

impl Default for Watering {
    fn default() -> Self {
        Self {
            duration_ms: 10_000,
            recheck_step_ms: 5_000,
            safety_wait: SafetyWait::Remaining,
        }
    }
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            default: 2200,
            step: 100,
            sensor_max: 1023,
        }
    }
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            relay: 17,
            indicator: 27,
            adc_channel: 0,
            adc_address: 0x48,
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self {
            connect_backoff_ms: 500,
            probe_timeout_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for Sim {
    fn default() -> Self {
        Self {
            scenario: "drying".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins on the Raspberry Pi 40-pin header available for general
/// use. GPIO 0-1 are reserved for the ID EEPROM.
const VALID_GPIO_PINS: std::ops::RangeInclusive<u8> = 2..=27;

/// Highest single-ended ADS1115 input.
const MAX_ADC_CHANNEL: u8 = 3;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Settings {
    /// Validate all settings. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub(crate) fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_endpoint(&mut errors);
        self.validate_timing(&mut errors);
        self.validate_threshold(&mut errors);
        self.validate_pins(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "settings validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_endpoint(&self, errors: &mut Vec<String>) {
        let e = &self.endpoint;
        if e.host.trim().is_empty() {
            errors.push("endpoint.host is empty".to_string());
        }
        if e.port == 0 {
            errors.push("endpoint.port must be non-zero".to_string());
        }
        if !e.path.starts_with('/') {
            errors.push(format!("endpoint.path '{}' must start with '/'", e.path));
        }
        if e.psk.is_empty() {
            errors.push("endpoint.psk is empty".to_string());
        }
    }

    fn validate_timing(&self, errors: &mut Vec<String>) {
        let positive = [
            ("schedule.poll_interval_ms", self.schedule.poll_interval_ms),
            ("schedule.measure_interval_ms", self.schedule.measure_interval_ms),
            ("watering.duration_ms", self.watering.duration_ms),
            ("watering.recheck_step_ms", self.watering.recheck_step_ms),
            ("network.connect_backoff_ms", self.network.connect_backoff_ms),
            ("network.probe_timeout_ms", self.network.probe_timeout_ms),
            ("network.request_timeout_ms", self.network.request_timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                errors.push(format!("{name} must be positive"));
            }
        }

        // Deadlines are compared by signed distance, so an interval must fit
        // in half the counter range.
        for (name, value) in [
            ("schedule.poll_interval_ms", self.schedule.poll_interval_ms),
            ("schedule.measure_interval_ms", self.schedule.measure_interval_ms),
        ] {
            if value > i32::MAX as u32 {
                errors.push(format!("{name} {value} exceeds {}", i32::MAX));
            }
        }
    }

    fn validate_threshold(&self, errors: &mut Vec<String>) {
        let t = &self.threshold;
        if t.step == 0 {
            errors.push("threshold.step must be positive".to_string());
        } else if u32::from(t.sensor_max) < 2 * u32::from(t.step) {
            errors.push(format!(
                "threshold range is empty: sensor_max ({}) is less than twice step ({})",
                t.sensor_max, t.step
            ));
        }
    }

    fn validate_pins(&self, errors: &mut Vec<String>) {
        let p = &self.pins;
        for (name, pin) in [("pins.relay", p.relay), ("pins.indicator", p.indicator)] {
            if !VALID_GPIO_PINS.contains(&pin) {
                errors.push(format!(
                    "{name} {pin} is not a valid BCM GPIO pin (allowed: 2-27)"
                ));
            }
        }
        if p.relay == p.indicator {
            errors.push(format!(
                "pins.relay and pins.indicator both use GPIO {}",
                p.relay
            ));
        }
        if p.adc_channel > MAX_ADC_CHANNEL {
            errors.push(format!(
                "pins.adc_channel {} out of range (0-{MAX_ADC_CHANNEL})",
                p.adc_channel
            ));
        }
    }

    /// Override selected values from the environment. `lookup` is
    /// `std::env::var` in production.
    pub(crate) fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(v) = lookup("DEVICE_ID") {
            self.device_id = v
                .trim()
                .parse()
                .with_context(|| format!("invalid DEVICE_ID: {v:?}"))?;
        }
        if let Some(v) = lookup("ENDPOINT_HOST") {
            self.endpoint.host = v;
        }
        if let Some(v) = lookup("ENDPOINT_PORT") {
            self.endpoint.port = v
                .trim()
                .parse()
                .with_context(|| format!("invalid ENDPOINT_PORT: {v:?}"))?;
        }
        if let Some(v) = lookup("ENDPOINT_PATH") {
            self.endpoint.path = v;
        }
        if let Some(v) = lookup("ENDPOINT_PSK") {
            self.endpoint.psk = v;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse settings from a TOML string. Missing keys take their defaults.
pub(crate) fn parse(contents: &str) -> Result<Settings> {
    toml::from_str(contents).context("failed to parse settings")
}

/// Read settings from `path` (built-in defaults when the file does not
/// exist), apply environment overrides, and validate.
pub(crate) fn load(path: &str) -> Result<Settings> {
    load_with(path, |key| std::env::var(key).ok())
}

/// [`load`] with the override source supplied by the caller.
pub(crate) fn load_with(path: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Settings> {
    let mut settings = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {path}"))?;
        parse(&contents).with_context(|| format!("in {path}"))?
    } else {
        tracing::warn!(path, "settings file not found, using built-in defaults");
        Settings::default()
    };

    settings.apply_overrides(lookup)?;
    settings
        .validate()
        .with_context(|| format!("invalid settings: {path}"))?;

    let t = &settings.threshold;
    if !(t.step..=t.sensor_max - t.step).contains(&t.default) {
        tracing::warn!(
            default = t.default,
            min = t.step,
            max = t.sensor_max - t.step,
            "default threshold lies outside the adjustable range; \
             increases will be refused until it is lowered into range"
        );
    }

    tracing::info!(
        device_id = settings.device_id,
        host = %settings.endpoint.host,
        port = settings.endpoint.port,
        "settings loaded"
    );

    Ok(settings)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(settings: &Settings, needle: &str) {
        let err = settings.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_empty_uses_defaults() {
        let s = parse("").unwrap();
        assert_eq!(s.device_id, 1);
        assert_eq!(s.threshold.default, 2200);
        assert_eq!(s.threshold.step, 100);
        assert_eq!(s.threshold.sensor_max, 1023);
        assert_eq!(s.watering.duration_ms, 10_000);
        assert_eq!(s.watering.safety_wait, SafetyWait::Remaining);
    }

    #[test]
    fn parse_full_settings() {
        let toml_str = r#"
device_id = 42

[endpoint]
host = "plants.local"
port = 8080
path = "/api/plant"
psk = "s3cret"

[schedule]
poll_interval_ms = 5000
measure_interval_ms = 60000

[watering]
duration_ms = 20000
recheck_step_ms = 2000
safety_wait = "slice"

[threshold]
default = 600
step = 50
sensor_max = 4095

[pins]
relay = 5
indicator = 6
adc_channel = 2
"#;
        let s = parse(toml_str).unwrap();
        assert_eq!(s.device_id, 42);
        assert_eq!(s.endpoint.host, "plants.local");
        assert_eq!(s.endpoint.port, 8080);
        assert_eq!(s.endpoint.path, "/api/plant");
        assert_eq!(s.schedule.poll_interval_ms, 5000);
        // Unset fields in a present section keep their defaults.
        assert_eq!(s.schedule.idle_ms, 100);
        assert_eq!(s.watering.safety_wait, SafetyWait::Slice);
        assert_eq!(s.threshold.sensor_max, 4095);
        assert_eq!(s.pins.adc_channel, 2);
        assert_eq!(s.pins.adc_address, 0x48);
    }

    #[test]
    fn parse_unknown_safety_wait_fails() {
        let err = parse("[watering]\nsafety_wait = \"sometimes\"").unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn example_file_is_valid_and_threshold_adjustable() {
        let s = parse(include_str!("../node.example.toml")).unwrap();
        s.validate().unwrap();
        let t = &s.threshold;
        assert!((t.step..=t.sensor_max - t.step).contains(&t.default));
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn default_settings_pass() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn default_threshold_outside_range_is_not_an_error() {
        let s = Settings::default();
        assert!(s.threshold.default > s.threshold.sensor_max - s.threshold.step);
        s.validate().unwrap();
    }

    #[test]
    fn empty_host_rejected() {
        let mut s = Settings::default();
        s.endpoint.host = "  ".into();
        assert_validation_err(&s, "endpoint.host is empty");
    }

    #[test]
    fn path_without_slash_rejected() {
        let mut s = Settings::default();
        s.endpoint.path = "plant".into();
        assert_validation_err(&s, "must start with '/'");
    }

    #[test]
    fn empty_psk_rejected() {
        let mut s = Settings::default();
        s.endpoint.psk = String::new();
        assert_validation_err(&s, "endpoint.psk is empty");
    }

    #[test]
    fn zero_interval_rejected() {
        let mut s = Settings::default();
        s.schedule.poll_interval_ms = 0;
        assert_validation_err(&s, "schedule.poll_interval_ms must be positive");
    }

    #[test]
    fn interval_beyond_half_counter_rejected() {
        let mut s = Settings::default();
        s.schedule.measure_interval_ms = u32::MAX;
        assert_validation_err(&s, "schedule.measure_interval_ms");
    }

    #[test]
    fn zero_step_rejected() {
        let mut s = Settings::default();
        s.threshold.step = 0;
        assert_validation_err(&s, "threshold.step must be positive");
    }

    #[test]
    fn empty_threshold_range_rejected() {
        let mut s = Settings::default();
        s.threshold.step = 600;
        assert_validation_err(&s, "threshold range is empty");
    }

    #[test]
    fn gpio_pin_out_of_whitelist_rejected() {
        let mut s = Settings::default();
        s.pins.relay = 1;
        assert_validation_err(&s, "pins.relay 1 is not a valid BCM GPIO pin");
    }

    #[test]
    fn shared_gpio_pin_rejected() {
        let mut s = Settings::default();
        s.pins.indicator = s.pins.relay;
        assert_validation_err(&s, "both use GPIO 17");
    }

    #[test]
    fn adc_channel_out_of_range_rejected() {
        let mut s = Settings::default();
        s.pins.adc_channel = 4;
        assert_validation_err(&s, "pins.adc_channel 4 out of range");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut s = Settings::default();
        s.endpoint.host = String::new();
        s.watering.duration_ms = 0;
        s.pins.indicator = 40;
        let msg = format!("{:#}", s.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "got: {msg}");
        assert!(msg.contains("endpoint.host"), "got: {msg}");
        assert!(msg.contains("watering.duration_ms"), "got: {msg}");
        assert!(msg.contains("pins.indicator"), "got: {msg}");
    }

    // -- Environment overrides --------------------------------------------

    #[test]
    fn overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            ("DEVICE_ID", "9"),
            ("ENDPOINT_HOST", "10.0.0.2"),
            ("ENDPOINT_PORT", "8081"),
            ("ENDPOINT_PSK", "abc"),
        ]
        .into_iter()
        .collect();

        let mut s = Settings::default();
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(s.device_id, 9);
        assert_eq!(s.endpoint.host, "10.0.0.2");
        assert_eq!(s.endpoint.port, 8081);
        assert_eq!(s.endpoint.psk, "abc");
        assert_eq!(s.endpoint.path, "/plant");
    }

    #[test]
    fn override_with_bad_number_fails() {
        let mut s = Settings::default();
        let err = s
            .apply_overrides(|k| (k == "ENDPOINT_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(format!("{err:#}").contains("invalid ENDPOINT_PORT"));
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let s = load_with("/nonexistent/plant-node.toml", |_| None).unwrap();
        assert_eq!(s.device_id, 1);
        assert_eq!(s.endpoint.port, 80);
        assert_eq!(s.threshold.step, 100);
    }

    #[test]
    fn load_applies_supplied_overrides() {
        let s = load_with("/nonexistent/plant-node.toml", |k| {
            (k == "DEVICE_ID").then(|| "12".to_string())
        })
        .unwrap();
        assert_eq!(s.device_id, 12);
    }

    #[test]
    fn load_rejects_invalid_override() {
        let err = load_with("/nonexistent/plant-node.toml", |k| {
            (k == "ENDPOINT_PSK").then(String::new)
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("endpoint.psk is empty"));
    }
}

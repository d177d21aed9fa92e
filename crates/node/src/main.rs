mod command;
mod config;
mod hw;
mod logger;
mod moisture;
mod node;
mod remote;
mod scheduler;
mod state;
mod watering;

#[cfg(feature = "adc")]
mod adc;
#[cfg(feature = "sim")]
mod sim;
#[cfg(test)]
mod testutil;

#[cfg(not(any(feature = "adc", feature = "sim")))]
compile_error!("enable a moisture source: feature \"adc\" or \"sim\"");

use anyhow::{Context, Result};
use std::env;
use tracing_subscriber::EnvFilter;

use config::Settings;
use hw::{Clock, TokioClock};
use node::Node;
use remote::{HttpTransport, RemoteClient};
use state::DeviceState;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Settings ────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "node.toml".to_string());
    let settings = config::load(&config_path)?;

    // ── Outputs ─────────────────────────────────────────────────────
    #[cfg(feature = "gpio")]
    let (relay, indicator) = {
        let gpio = rppal::gpio::Gpio::new().context("failed to open gpio")?;
        (
            hw::GpioOutput::new(&gpio, "relay", settings.pins.relay)?,
            hw::GpioOutput::new(&gpio, "indicator", settings.pins.indicator)?,
        )
    };
    #[cfg(not(feature = "gpio"))]
    let (relay, indicator) = (
        hw::MockOutput::new("relay", settings.pins.relay),
        hw::MockOutput::new("indicator", settings.pins.indicator),
    );

    // ── Moisture sensor ─────────────────────────────────────────────
    let sensor = moisture_sensor(&settings, &relay)?;

    // ── Network ─────────────────────────────────────────────────────
    let transport = HttpTransport::new(&settings.endpoint, &settings.network)?;
    let remote = RemoteClient::new(
        transport,
        indicator,
        settings.endpoint.clone(),
        settings.network.connect_backoff_ms,
    );

    // ── Control loop ────────────────────────────────────────────────
    let clock = TokioClock::new();
    let mut state = DeviceState::new(&settings, clock.now_ms());
    let mut node = Node::new(clock, sensor, relay, remote, settings);

    tokio::select! {
        _ = node.run(&mut state) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown requested");
        }
    }
    node.shutdown();

    Ok(())
}

#[cfg(feature = "adc")]
fn moisture_sensor<O>(settings: &Settings, _relay: &O) -> Result<adc::Ads1115> {
    adc::Ads1115::new(
        settings.pins.adc_address,
        settings.pins.adc_channel,
        settings.threshold.sensor_max,
    )
    .context("failed to open ADS1115")
}

#[cfg(all(feature = "sim", not(feature = "adc"), not(feature = "gpio")))]
fn moisture_sensor(settings: &Settings, relay: &hw::MockOutput) -> Result<sim::SoilMoistureSim> {
    let scenario = sim::Scenario::from_str_lossy(&settings.sim.scenario);
    tracing::info!(%scenario, "using simulated moisture sensor");
    Ok(sim::SoilMoistureSim::new(
        scenario,
        settings.threshold.sensor_max,
        Some(relay.probe()),
    ))
}

#[cfg(all(feature = "sim", not(feature = "adc"), feature = "gpio"))]
fn moisture_sensor<O>(settings: &Settings, _relay: &O) -> Result<sim::SoilMoistureSim> {
    let scenario = sim::Scenario::from_str_lossy(&settings.sim.scenario);
    tracing::info!(%scenario, "using simulated moisture sensor (open loop)");
    Ok(sim::SoilMoistureSim::new(
        scenario,
        settings.threshold.sensor_max,
        None,
    ))
}

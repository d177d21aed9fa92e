//! ADS1115 16-bit ADC driver over I2C for the soil moisture probe.
//!
//! Reads one single-ended channel at PGA ±4.096 V, 128 SPS, single-shot mode.
//! A capacitive probe powered from 3.3 V reads higher when the soil is drier.
//! Conversions are scaled to `0..=full_scale` so thresholds mean the same
//! thing whichever moisture source is compiled in.

use anyhow::Result;
use rppal::i2c::I2c;
use std::{thread, time::Duration};

use crate::hw::SensorReader;

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       : write 1 to start single-shot conversion
//   [14:12] MUX      : input multiplexer (channel selection)
//   [11:9]  PGA      : programmable gain amplifier
//   [8]     MODE     : 0 = continuous, 1 = single-shot
//   [7:5]   DR       : data rate
//   [4:2]   comparator settings (unused)
//   [1:0]   COMP_QUE : 11 = disable comparator

/// OS=1 (start), PGA=001 (±4.096 V), MODE=1 (single-shot),
/// DR=100 (128 SPS), COMP_QUE=11 (comparator off).
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// MUX values for single-ended reads (AINx vs GND).
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

/// Highest valid single-ended channel index.
const MAX_CHANNEL: u8 = 3;

/// Conversion time at 128 SPS is ~7.8 ms.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Bit 15 of the config register: conversion-ready flag when read.
const OS_READY_BIT: u16 = 1 << 15;

/// Largest single-ended reading.
pub(crate) const ADS1115_MAX: u16 = 32767;

/// Config register value for a single-ended read on `channel`.
fn config_for_channel(channel: u8) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[usize::from(channel)] << MUX_SHIFT)
}

/// Map a raw conversion to the single-ended range. Negative values only
/// appear from bus corruption or inputs below ground.
fn single_ended(raw: i16) -> u16 {
    raw.max(0) as u16
}

/// Map `0..=ADS1115_MAX` onto `0..=full_scale`.
fn scale(reading: u16, full_scale: u16) -> u16 {
    (u32::from(reading) * u32::from(full_scale) / u32::from(ADS1115_MAX)) as u16
}

// ── Driver ──────────────────────────────────────────────────────────────────

pub(crate) struct Ads1115 {
    i2c: I2c,
    channel: u8,
    full_scale: u16,
}

impl Ads1115 {
    /// Open I2C bus 1 and address the ADS1115 at `addr`.
    pub(crate) fn new(addr: u16, channel: u8, full_scale: u16) -> Result<Self> {
        anyhow::ensure!(
            channel <= MAX_CHANNEL,
            "ADS1115 channel {channel} out of range (0–{MAX_CHANNEL})"
        );

        let mut i2c = I2c::new()?;
        i2c.set_slave_address(addr)?;

        tracing::info!(
            addr = format_args!("0x{addr:02x}"),
            channel,
            full_scale,
            "ads1115 initialised"
        );

        Ok(Self {
            i2c,
            channel,
            full_scale,
        })
    }
}

impl SensorReader for Ads1115 {
    fn read(&mut self) -> Result<u16> {
        let config = config_for_channel(self.channel);
        self.i2c.block_write(REG_CONFIG, &config.to_be_bytes())?;

        thread::sleep(CONVERSION_WAIT);

        // Normally one wait is enough at 128 SPS; poll the ready bit briefly.
        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        let raw = single_ended(i16::from_be_bytes(buf));
        Ok(scale(raw, self.full_scale))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

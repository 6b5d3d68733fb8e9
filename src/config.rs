use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pixel_format::PixelFormat;
use crate::protocol::SerialProtocol;

pub const NUM_STRIPS: usize = 8;
pub const LEDS_PER_STRIP: usize = 550;
pub const OPEN_PIXEL_PORT: u16 = 7890;

/// Largest strip whose payload still fits the 16-bit OPC length field
pub const MAX_LEDS_PER_STRIP: usize = u16::MAX as usize / 3;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub opc: OpcConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default = "default_persist_path")]
    pub persist_path: PathBuf,
    #[serde(default = "default_pattern_fps")]
    pub pattern_fps: u32,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpcConfig {
    pub host: String,
    pub port: u16,
}

impl Default for OpcConfig {
    fn default() -> Self {
        OpcConfig {
            host: "0.0.0.0".to_string(),
            port: OPEN_PIXEL_PORT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayoutConfig {
    pub strips: usize,
    pub leds_per_strip: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            strips: NUM_STRIPS,
            leds_per_strip: LEDS_PER_STRIP,
        }
    }
}

impl LayoutConfig {
    /// Largest acceptable set-pixels payload, in bytes
    pub fn max_payload(&self) -> usize {
        3 * self.leds_per_strip
    }
}

/// One serial-attached LED driver fed from a slice of a strip
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub port: String,
    pub protocol: SerialProtocol,
    pub baud_rate: u32,
    /// 1-based strip, same numbering as the OPC channel
    pub strip: u8,
    pub led_count: usize,
    #[serde(default)]
    pub strip_offset: usize,
    #[serde(default)]
    pub pixel_format: PixelFormat,
}

fn default_persist_path() -> PathBuf {
    PathBuf::from("persist.json")
}

fn default_pattern_fps() -> u32 {
    60
}

fn default_stats_interval() -> u64 {
    5
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_data = fs::read_to_string(path)
            .context(format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_data)
            .context(format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        ensure!(
            (1..=255).contains(&layout.strips),
            "layout.strips must be in 1..=255, got {}",
            layout.strips
        );
        ensure!(
            (1..=MAX_LEDS_PER_STRIP).contains(&layout.leds_per_strip),
            "layout.leds_per_strip must be in 1..={}, got {}",
            MAX_LEDS_PER_STRIP,
            layout.leds_per_strip
        );
        ensure!(self.pattern_fps > 0, "pattern_fps must be positive");

        for output in &self.outputs {
            ensure!(
                output.strip >= 1 && output.strip as usize <= layout.strips,
                "output {} targets strip {} but only {} strips exist",
                output.port,
                output.strip,
                layout.strips
            );
            ensure!(
                output.led_count > 0 && output.strip_offset + output.led_count <= layout.leds_per_strip,
                "output {} needs LEDs {}..{} but strips have {}",
                output.port,
                output.strip_offset,
                output.strip_offset + output.led_count,
                layout.leds_per_strip
            );
        }
        Ok(())
    }
}

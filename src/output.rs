use anyhow::{Context, Result};
use serialport::SerialPort;
use std::io::Write;
use std::thread;
use std::time::Duration;
use tracing::{info, trace, warn};

use crate::config::OutputConfig;

/// Hardware-facing end of the frame buffer.
///
/// `push` is synchronous: when it returns the frame has been handed to the
/// hardware and the next commit may start.
pub trait DisplaySink {
    /// `frame` holds every strip back to back, `leds_per_strip` pixels each
    fn push(&mut self, frame: &[u32], leds_per_strip: usize) -> Result<()>;
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn push(&mut self, frame: &[u32], leds_per_strip: usize) -> Result<()> {
        (**self).push(frame, leds_per_strip)
    }
}

/// Sink used when no outputs are configured
#[derive(Debug, Default)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn push(&mut self, frame: &[u32], _leds_per_strip: usize) -> Result<()> {
        trace!(pixels = frame.len(), "frame dropped by null sink");
        Ok(())
    }
}

/// One LED driver board fed from a slice of one strip
pub struct SerialOutput<W = Box<dyn SerialPort>> {
    config: OutputConfig,
    port: W,
}

impl SerialOutput {
    pub fn open(config: OutputConfig) -> Result<Self> {
        let mut port = serialport::new(&config.port, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(1000))
            .open()
            .context(format!("Failed to open serial port {}", config.port))?;

        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!(port = %config.port, error = %e, "failed to set DTR");
        }

        // Allow device to initialize
        thread::sleep(Duration::from_millis(100));

        info!(
            port = %config.port,
            strip = config.strip,
            offset = config.strip_offset,
            leds = config.led_count,
            protocol = ?config.protocol,
            baud = config.baud_rate,
            "opened serial output"
        );

        Ok(SerialOutput::new(config, port))
    }
}

impl<W: Write> SerialOutput<W> {
    pub fn new(config: OutputConfig, port: W) -> Self {
        SerialOutput { config, port }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Slice this output's LEDs out of `strip`, encode, and frame them
    fn frame_for(&self, strip: &[u32]) -> Vec<u8> {
        let config = &self.config;
        let end = (config.strip_offset + config.led_count).min(strip.len());
        let pixels = strip.get(config.strip_offset..end).unwrap_or(&[]);

        let wire = config.pixel_format.encode(pixels);
        config.protocol.build_frame(&wire, config.pixel_format.stride())
    }

    fn write_strip(&mut self, strip: &[u32]) -> Result<()> {
        let frame = self.frame_for(strip);
        let port = &self.config.port;
        trace!(%port, bytes = frame.len(), "writing serial frame");

        self.port
            .write_all(&frame)
            .context(format!("Serial write failed on {}", port))?;
        self.port
            .flush()
            .context(format!("Serial flush failed on {}", port))?;
        Ok(())
    }
}

/// Fan-out of the display buffer to every configured output
pub struct SerialSink<W = Box<dyn SerialPort>> {
    outputs: Vec<SerialOutput<W>>,
}

impl SerialSink {
    /// Open every configured port. A port that fails to open is logged and
    /// skipped so the remaining boards still run.
    pub fn open(configs: &[OutputConfig]) -> Self {
        let outputs = configs
            .iter()
            .cloned()
            .filter_map(|config| {
                let port = config.port.clone();
                match SerialOutput::open(config) {
                    Ok(output) => Some(output),
                    Err(e) => {
                        warn!(%port, error = %e, "failed to open output, skipping");
                        None
                    }
                }
            })
            .collect();
        SerialSink { outputs }
    }
}

impl<W: Write> SerialSink<W> {
    pub fn new(outputs: Vec<SerialOutput<W>>) -> Self {
        SerialSink { outputs }
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}

impl<W: Write> DisplaySink for SerialSink<W> {
    fn push(&mut self, frame: &[u32], leds_per_strip: usize) -> Result<()> {
        let mut first_error = None;

        for output in &mut self.outputs {
            let strip = (output.config().strip as usize).saturating_sub(1);
            let start = strip * leds_per_strip;
            let Some(pixels) = frame.get(start..start + leds_per_strip) else {
                continue;
            };

            // Keep feeding the other boards if one fails
            if let Err(e) = output.write_strip(pixels) {
                warn!(error = %e, "serial output failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Keeps every pushed frame, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<Vec<u32>>,
    pub fail: bool,
}

#[cfg(test)]
impl DisplaySink for RecordingSink {
    fn push(&mut self, frame: &[u32], _leds_per_strip: usize) -> Result<()> {
        if self.fail {
            anyhow::bail!("sink unplugged");
        }
        self.frames.push(frame.to_vec());
        Ok(())
    }
}

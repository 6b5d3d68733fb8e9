//! Open Pixel Control: streaming decoder and commit coalescing.
//!
//! Wire format, per message:
//!
//! ```text
//! byte 0     channel  (1..=strips)
//! byte 1     command  (0 = set pixels)
//! bytes 2-3  length   (big-endian payload byte count)
//! payload    length / 3 RGB triples
//! ```
//!
//! See <http://openpixelcontrol.org/>.

mod coalescer;
mod decoder;

use thiserror::Error;

use crate::color::Rgb;

pub use coalescer::ChannelCoalescer;
pub use decoder::ProtocolDecoder;

pub const HEADER_LEN: usize = 4;
pub const CMD_SET_PIXELS: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub channel: u8,
    pub command: u8,
    pub length: u16,
}

impl MessageHeader {
    pub fn parse(bytes: [u8; HEADER_LEN]) -> Self {
        MessageHeader {
            channel: bytes[0],
            command: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
        }
    }

    #[cfg(test)]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let [hi, lo] = self.length.to_be_bytes();
        [self.channel, self.command, hi, lo]
    }
}

/// A message the decoder drains without applying. The connection stays open;
/// the `Display` text goes to the operator status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("OPC BAD CMD {0}")]
    UnsupportedCommand(u8),
    #[error("OPC BAD CHAN {0}")]
    InvalidChannel(u8),
    #[error("OPC TOO MANY PIXELS")]
    TooManyPixels { pixels: usize },
}

/// Where decoded messages land
pub trait FrameTarget {
    /// `strip` is 0-based
    fn set_pixel(&mut self, strip: usize, led: usize, color: Rgb);

    /// Push everything written so far to the hardware
    fn show(&mut self);

    fn protocol_error(&mut self, _error: &ProtocolError) {}
}

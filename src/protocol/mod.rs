//! Serial framing understood by the downstream LED driver boards.

mod adalight;
mod awa;

use serde::{Deserialize, Serialize};

pub use adalight::build_adalight_frame;
pub use awa::build_awa_frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialProtocol {
    /// HyperSerial "Awa" framing with Fletcher checksums
    Awa,
    Adalight,
}

impl SerialProtocol {
    pub fn build_frame(self, pixel_data: &[u8], stride: usize) -> Vec<u8> {
        match self {
            SerialProtocol::Awa => build_awa_frame(pixel_data, stride),
            SerialProtocol::Adalight => build_adalight_frame(pixel_data, stride),
        }
    }
}

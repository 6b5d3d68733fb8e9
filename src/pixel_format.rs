use serde::{Deserialize, Serialize};

use crate::color::unpack;

/// Channel order expected by a serial LED driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    #[default]
    Rgb,
    Grb,
    Bgr,
    Rgbw,
    Grbw,
}

impl PixelFormat {
    /// Bytes per pixel on the wire
    pub fn stride(self) -> usize {
        match self {
            PixelFormat::Rgbw | PixelFormat::Grbw => 4,
            _ => 3,
        }
    }

    /// Encode packed display pixels into wire bytes
    pub fn encode(self, pixels: &[u32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(pixels.len() * self.stride());

        for &packed in pixels {
            let rgb = unpack(packed);
            let (r, g, b) = (rgb.r, rgb.g, rgb.b);
            match self {
                PixelFormat::Rgb => out.extend_from_slice(&[r, g, b]),
                PixelFormat::Grb => out.extend_from_slice(&[g, r, b]),
                PixelFormat::Bgr => out.extend_from_slice(&[b, g, r]),
                PixelFormat::Rgbw | PixelFormat::Grbw => {
                    // White is the common part of all three channels
                    let w = r.min(g).min(b);
                    if self == PixelFormat::Rgbw {
                        out.extend_from_slice(&[r - w, g - w, b - w, w]);
                    } else {
                        out.extend_from_slice(&[g - w, r - w, b - w, w]);
                    }
                }
            }
        }

        out
    }
}

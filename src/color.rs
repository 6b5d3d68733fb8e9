//! Color model: packed 24-bit pixels and the HSL/RGB helpers used by the
//! fallback patterns and the operator `--color` option.

use anyhow::{bail, Context, Result};

pub type Rgb = smart_leds::RGB8;

pub const RED: u32 = 0xFF0000;
pub const GREEN: u32 = 0x00FF00;
pub const BLUE: u32 = 0x0000FF;
pub const YELLOW: u32 = 0xFFFF00;
pub const PINK: u32 = 0xFF1088;
pub const ORANGE: u32 = 0xE05800;
pub const WHITE: u32 = 0xFFFFFF;
pub const BLACK: u32 = 0x000000;

/// Pack three channels into `0xRRGGBB`, clamping each to 255.
pub fn make_color_rgb(red: u32, green: u32, blue: u32) -> u32 {
    (red.min(255) << 16) | (green.min(255) << 8) | blue.min(255)
}

pub fn pack(color: Rgb) -> u32 {
    make_color_rgb(color.r as u32, color.g as u32, color.b as u32)
}

pub fn unpack(packed: u32) -> Rgb {
    Rgb::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
}

fn h2rgb(v1: u32, v2: u32, hue: u32) -> u32 {
    if hue < 60 {
        return v1 * 60 + (v2 - v1) * hue;
    }
    if hue < 180 {
        return v2 * 60;
    }
    if hue < 240 {
        return v1 * 60 + (v2 - v1) * (240 - hue);
    }
    v1 * 60
}

/// Convert HSL to a packed color.
///
/// * `hue`: 0..=359, position on the color wheel (0 red, 120 green, 240 blue).
///   Larger values wrap.
/// * `saturation`: 0..=100, clamped.
/// * `lightness`: 0..=100, clamped. 50 is the pure color, 100 is white.
///
/// Integer-only, so it behaves identically on a microcontroller.
pub fn make_color_hsl(hue: u32, saturation: u32, lightness: u32) -> u32 {
    let hue = hue % 360;
    let saturation = saturation.min(100);
    let lightness = lightness.min(100);

    if saturation == 0 {
        let level = lightness * 255 / 100;
        return make_color_rgb(level, level, level);
    }

    let var2 = if lightness < 50 {
        lightness * (100 + saturation)
    } else {
        (lightness + saturation) * 100 - saturation * lightness
    };
    let var1 = lightness * 200 - var2;

    let red_hue = if hue < 240 { hue + 120 } else { hue - 240 };
    let blue_hue = if hue >= 120 { hue - 120 } else { hue + 240 };

    let red = h2rgb(var1, var2, red_hue) * 255 / 600_000;
    let green = h2rgb(var1, var2, hue) * 255 / 600_000;
    let blue = h2rgb(var1, var2, blue_hue) * 255 / 600_000;
    make_color_rgb(red, green, blue)
}

fn named_color(name: &str) -> Option<u32> {
    let packed = match name.to_ascii_lowercase().as_str() {
        "red" => RED,
        "green" => GREEN,
        "blue" => BLUE,
        "yellow" => YELLOW,
        "pink" => PINK,
        "orange" => ORANGE,
        "white" => WHITE,
        "black" => BLACK,
        _ => return None,
    };
    Some(packed)
}

/// Parse an operator-supplied color: `#RRGGBB`, `RRGGBB`, `hsl:H,S,L` or a
/// named color such as `pink`.
pub fn parse_color(text: &str) -> Result<Rgb> {
    let text = text.trim();

    if let Some(packed) = named_color(text) {
        return Ok(unpack(packed));
    }

    if let Some(hsl) = text.strip_prefix("hsl:") {
        let parts: Vec<&str> = hsl.split(',').map(str::trim).collect();
        let [h, s, l] = parts.as_slice() else {
            bail!("expected hsl:H,S,L, got {:?}", text);
        };
        let h: u32 = h.parse().context("invalid hue")?;
        let s: u32 = s.parse().context("invalid saturation")?;
        let l: u32 = l.parse().context("invalid lightness")?;
        return Ok(unpack(make_color_hsl(h, s, l)));
    }

    let hex = text.strip_prefix('#').unwrap_or(text);
    if hex.len() != 6 {
        bail!("expected 6 hex digits, got {:?}", text);
    }
    let packed = u32::from_str_radix(hex, 16).context(format!("invalid hex color {:?}", text))?;
    Ok(unpack(packed))
}

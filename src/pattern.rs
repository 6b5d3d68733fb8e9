use serde::{Deserialize, Serialize};

use crate::color::{make_color_rgb, unpack, Rgb};
use crate::frame_buffer::FrameBuffer;
use crate::persist::PersistConfig;

/// Content shown while no OPC client is connected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Every pixel the stored color
    Solid,
    /// Red ramp on every strip, for checking wiring
    #[default]
    Test,
}

#[derive(Debug)]
pub struct PatternEngine {
    pattern: Pattern,
    solid_color: Rgb,
    hue: u8,
}

impl PatternEngine {
    pub fn new(persisted: &PersistConfig) -> Self {
        let mut engine = PatternEngine {
            pattern: Pattern::Test,
            solid_color: Rgb::default(),
            hue: 0,
        };
        engine.load(persisted);
        engine
    }

    pub fn load(&mut self, persisted: &PersistConfig) {
        self.pattern = persisted.pattern;
        self.solid_color = unpack(persisted.solid_color);
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn solid_color(&self) -> Rgb {
        self.solid_color
    }

    pub fn set_solid_color(&mut self, color: Rgb) {
        self.pattern = Pattern::Solid;
        self.solid_color = color;
    }

    pub fn test_pattern(&mut self) {
        self.pattern = Pattern::Test;
    }

    /// Draw the next frame of the active pattern into the drawing buffer
    pub fn render(&mut self, frame: &mut FrameBuffer) {
        match self.pattern {
            Pattern::Solid => frame.fill(self.solid_color),
            Pattern::Test => {
                frame.fill(unpack(make_color_rgb(self.hue as u32, 0, 0)));
                self.hue = self.hue.wrapping_add(1);
            }
        }
    }
}

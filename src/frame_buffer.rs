use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::color::{pack, unpack, Rgb, BLACK};
use crate::config::LayoutConfig;
use crate::output::DisplaySink;

const FRAME_RATE_WINDOW: Duration = Duration::from_secs(1);

/// Commits-per-second counter, rolled over on whole-second boundaries
#[derive(Debug)]
struct FrameRateCounter {
    window_start: Instant,
    frames: u32,
    last_rate: u32,
}

impl FrameRateCounter {
    fn new(now: Instant) -> Self {
        FrameRateCounter {
            window_start: now,
            frames: 0,
            last_rate: 0,
        }
    }

    /// Returns the new rate when the window rolls over
    fn record(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        if now.duration_since(self.window_start) < FRAME_RATE_WINDOW {
            return None;
        }
        self.last_rate = self.frames;
        self.frames = 0;
        self.window_start = now;
        Some(self.last_rate)
    }
}

/// Double-buffered pixel storage for every strip.
///
/// Writers mutate the drawing buffer only. `commit` snapshots it into the
/// display buffer and hands that to the hardware sink, so a sink never sees a
/// half-written frame.
pub struct FrameBuffer {
    strips: usize,
    leds_per_strip: usize,
    drawing: Vec<u32>,
    display: Vec<u32>,
    powered: bool,
    commits: u64,
    frame_rate: FrameRateCounter,
}

impl FrameBuffer {
    pub fn new(layout: &LayoutConfig) -> Self {
        let pixels = layout.strips * layout.leds_per_strip;
        FrameBuffer {
            strips: layout.strips,
            leds_per_strip: layout.leds_per_strip,
            drawing: vec![BLACK; pixels],
            display: vec![BLACK; pixels],
            powered: true,
            commits: 0,
            frame_rate: FrameRateCounter::new(Instant::now()),
        }
    }

    pub fn strips(&self) -> usize {
        self.strips
    }

    pub fn leds_per_strip(&self) -> usize {
        self.leds_per_strip
    }

    fn index(&self, strip: usize, led: usize) -> Option<usize> {
        if strip < self.strips && led < self.leds_per_strip {
            Some(strip * self.leds_per_strip + led)
        } else {
            None
        }
    }

    /// Write one pixel of the drawing buffer.
    ///
    /// Callers validate indices up front; an out-of-range write panics in
    /// debug builds and is dropped in release builds.
    pub fn set_pixel(&mut self, strip: usize, led: usize, color: Rgb) {
        match self.index(strip, led) {
            Some(i) => self.drawing[i] = pack(color),
            None => {
                debug_assert!(false, "set_pixel out of range: strip {} led {}", strip, led);
                error!(strip, led, "set_pixel out of range, ignored");
            }
        }
    }

    pub fn get_pixel(&self, strip: usize, led: usize) -> Option<Rgb> {
        self.index(strip, led).map(|i| unpack(self.drawing[i]))
    }

    /// The pixels of one strip as committed to hardware
    pub fn display_strip(&self, strip: usize) -> Option<&[u32]> {
        let start = self.index(strip, 0)?;
        self.display.get(start..start + self.leds_per_strip)
    }

    pub fn fill(&mut self, color: Rgb) {
        self.drawing.fill(pack(color));
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn toggle_power(&mut self) -> bool {
        self.powered = !self.powered;
        self.powered
    }

    pub fn commit<D: DisplaySink + ?Sized>(&mut self, sink: &mut D) -> Result<Option<u32>> {
        self.commit_at(sink, Instant::now())
    }

    /// Copy the drawing buffer to the display buffer and push it to `sink`.
    ///
    /// Blocks until the sink returns, so commits never overlap. Returns the
    /// frame rate when a one-second window has just closed.
    pub fn commit_at<D: DisplaySink + ?Sized>(&mut self, sink: &mut D, now: Instant) -> Result<Option<u32>> {
        if self.powered {
            self.display.copy_from_slice(&self.drawing);
        } else {
            self.display.fill(BLACK);
        }
        self.commits += 1;
        let rate = self.frame_rate.record(now);
        if let Some(fps) = rate {
            debug!(fps, "frame rate window closed");
        }

        sink.push(&self.display, self.leds_per_strip)?;
        Ok(rate)
    }

    /// Commits counted in the last completed one-second window
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate.last_rate
    }

    pub fn commit_count(&self) -> u64 {
        self.commits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{unpack, RED};
    use crate::output::RecordingSink;

    fn small() -> FrameBuffer {
        FrameBuffer::new(&LayoutConfig {
            strips: 3,
            leds_per_strip: 4,
        })
    }

    #[test]
    fn test_set_get_pixel() {
        let mut fb = small();
        fb.set_pixel(2, 3, Rgb::new(1, 2, 3));
        assert_eq!(fb.get_pixel(2, 3), Some(Rgb::new(1, 2, 3)));
        assert_eq!(fb.get_pixel(0, 0), Some(Rgb::new(0, 0, 0)));
        assert_eq!(fb.get_pixel(3, 0), None);
        assert_eq!(fb.get_pixel(0, 4), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    #[cfg(debug_assertions)]
    fn test_set_pixel_out_of_range_panics_in_debug() {
        let mut fb = small();
        fb.set_pixel(3, 0, Rgb::new(1, 1, 1));
    }

    #[test]
    fn test_commit_is_double_buffered() {
        let mut fb = small();
        let mut sink = RecordingSink::default();

        fb.set_pixel(1, 0, unpack(RED));
        assert_eq!(fb.display_strip(1).unwrap()[0], BLACK);

        fb.commit(&mut sink).unwrap();
        assert_eq!(fb.display_strip(1).unwrap()[0], RED);
        assert_eq!(sink.frames.len(), 1);
        assert_eq!(sink.frames[0][4], RED);

        // Drawing again does not touch what was pushed
        fb.set_pixel(1, 0, Rgb::new(0, 0, 9));
        assert_eq!(fb.display_strip(1).unwrap()[0], RED);
        assert_eq!(fb.commit_count(), 1);
    }

    #[test]
    fn test_power_off_pushes_black() {
        let mut fb = small();
        let mut sink = RecordingSink::default();
        fb.fill(unpack(RED));

        assert!(!fb.toggle_power());
        fb.commit(&mut sink).unwrap();
        assert!(sink.frames[0].iter().all(|&p| p == BLACK));
        assert_eq!(fb.get_pixel(0, 0), Some(unpack(RED)));

        assert!(fb.toggle_power());
        fb.commit(&mut sink).unwrap();
        assert!(sink.frames[1].iter().all(|&p| p == RED));
    }

    #[test]
    fn test_frame_rate_window() {
        let mut fb = small();
        let mut sink = RecordingSink::default();
        let start = Instant::now();
        fb.frame_rate = FrameRateCounter::new(start);

        for i in 0..29 {
            let at = start + Duration::from_millis(i * 30);
            assert_eq!(fb.commit_at(&mut sink, at).unwrap(), None);
        }
        assert_eq!(fb.frame_rate(), 0);

        let rolled = fb.commit_at(&mut sink, start + Duration::from_millis(1000)).unwrap();
        assert_eq!(rolled, Some(30));
        assert_eq!(fb.frame_rate(), 30);

        fb.commit_at(&mut sink, start + Duration::from_millis(1100)).unwrap();
        assert_eq!(fb.frame_rate(), 30);
    }
}

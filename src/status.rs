use tracing::info;

pub const STATUS_LINES: usize = 4;
pub const LINE_FRAME_RATE: usize = 2;
pub const LINE_OPC: usize = 3;

/// Text shown on the operator display, one string per line
#[derive(Debug, Default)]
pub struct StatusBoard {
    lines: [String; STATUS_LINES],
}

impl StatusBoard {
    pub fn set(&mut self, line: usize, text: impl Into<String>) {
        let text = text.into();
        let Some(slot) = self.lines.get_mut(line) else {
            return;
        };
        if *slot != text {
            info!(target: "status", line, "{}", text);
            *slot = text;
        }
    }

    pub fn line(&self, line: usize) -> &str {
        self.lines.get(line).map_or("", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read_lines() {
        let mut status = StatusBoard::default();
        status.set(LINE_OPC, "OpenPixel Connected");
        assert_eq!(status.line(LINE_OPC), "OpenPixel Connected");
        assert_eq!(status.line(0), "");

        status.set(LINE_OPC, "");
        assert_eq!(status.line(LINE_OPC), "");
    }

    #[test]
    fn test_out_of_range_line_is_ignored() {
        let mut status = StatusBoard::default();
        status.set(STATUS_LINES, "nowhere");
        assert_eq!(status.line(STATUS_LINES), "");
    }
}

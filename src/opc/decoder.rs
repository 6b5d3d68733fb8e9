use tracing::{debug, enabled, error, trace, warn, Level};

use super::{ChannelCoalescer, FrameTarget, MessageHeader, ProtocolError, CMD_SET_PIXELS, HEADER_LEN};
use crate::color::Rgb;
use crate::config::LayoutConfig;

/// A header that has been parsed and validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Message {
    header: MessageHeader,
    /// 0-based; an invalid channel is clamped to the first strip
    strip: usize,
    discard: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    AwaitingHeader {
        header: [u8; HEADER_LEN],
        filled: usize,
    },
    ReadingPayload {
        message: Message,
        received: usize,
    },
}

impl DecoderState {
    const IDLE: DecoderState = DecoderState::AwaitingHeader {
        header: [0; HEADER_LEN],
        filled: 0,
    };
}

/// Incremental OPC decoder for one client connection.
///
/// Bytes may arrive in any chunking; partial headers and payloads carry over
/// between `feed` calls. Malformed messages are drained in full so the stream
/// never desynchronizes. Create a fresh decoder for every connection.
#[derive(Debug)]
pub struct ProtocolDecoder {
    layout: LayoutConfig,
    state: DecoderState,
    payload: Vec<u8>,
    coalescer: ChannelCoalescer,
    messages: u64,
}

impl ProtocolDecoder {
    pub fn new(layout: LayoutConfig) -> Self {
        ProtocolDecoder {
            layout,
            state: DecoderState::IDLE,
            payload: Vec::with_capacity(layout.max_payload()),
            coalescer: ChannelCoalescer::default(),
            messages: 0,
        }
    }

    /// Consume `input`, applying every message it completes to `target`.
    /// Returns the number of messages completed (applied or discarded).
    pub fn feed<T: FrameTarget + ?Sized>(&mut self, mut input: &[u8], target: &mut T) -> usize {
        let mut completed = 0;

        while !input.is_empty() {
            match self.state {
                DecoderState::AwaitingHeader { mut header, mut filled } => {
                    let take = (HEADER_LEN - filled).min(input.len());
                    header[filled..filled + take].copy_from_slice(&input[..take]);
                    filled += take;
                    input = &input[take..];

                    if filled < HEADER_LEN {
                        self.state = DecoderState::AwaitingHeader { header, filled };
                        break;
                    }

                    let message = self.begin_message(MessageHeader::parse(header), target);
                    if message.header.length == 0 {
                        trace!(channel = message.header.channel, "empty message");
                        self.state = DecoderState::IDLE;
                        self.messages += 1;
                        completed += 1;
                    } else {
                        self.payload.clear();
                        self.state = DecoderState::ReadingPayload { message, received: 0 };
                    }
                }
                DecoderState::ReadingPayload { message, mut received } => {
                    let length = message.header.length as usize;
                    let take = (length - received).min(input.len());
                    if !message.discard {
                        self.payload.extend_from_slice(&input[..take]);
                    }
                    received += take;
                    input = &input[take..];

                    if received < length {
                        self.state = DecoderState::ReadingPayload { message, received };
                        break;
                    }

                    self.state = DecoderState::IDLE;
                    self.finish_message(message, target);
                    completed += 1;
                }
            }
        }

        completed
    }

    fn begin_message<T: FrameTarget + ?Sized>(&mut self, header: MessageHeader, target: &mut T) -> Message {
        let mut channel = header.channel;
        let mut problem = None;

        if header.command != CMD_SET_PIXELS {
            problem = Some(ProtocolError::UnsupportedCommand(header.command));
        }
        if channel < 1 || channel as usize > self.layout.strips {
            problem.get_or_insert(ProtocolError::InvalidChannel(channel));
            channel = 1;
        }
        if header.length as usize > self.layout.max_payload() {
            problem.get_or_insert(ProtocolError::TooManyPixels {
                pixels: header.length as usize / 3,
            });
        }

        self.coalescer.observe(channel);

        if let Some(problem) = &problem {
            warn!(
                channel = header.channel,
                command = header.command,
                length = header.length,
                "{}, discarding message",
                problem
            );
            target.protocol_error(problem);
        }

        Message {
            header,
            strip: channel as usize - 1,
            discard: problem.is_some(),
        }
    }

    fn finish_message<T: FrameTarget + ?Sized>(&mut self, message: Message, target: &mut T) {
        self.messages += 1;

        if message.discard {
            trace!(length = message.header.length, "drained discarded message");
            return;
        }

        if self.payload.len() != message.header.length as usize {
            error!(
                expected = message.header.length,
                buffered = self.payload.len(),
                "payload length mismatch, dropping message"
            );
            return;
        }

        if enabled!(Level::TRACE) {
            let hex: String = self
                .payload
                .iter()
                .take(30)
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");
            trace!(channel = message.header.channel, bytes = self.payload.len(), "payload starts {}", hex);
        }

        let pixels = self.payload.chunks_exact(3);
        if !pixels.remainder().is_empty() {
            debug!(
                channel = message.header.channel,
                length = message.header.length,
                "ignoring trailing partial pixel"
            );
        }
        for (led, rgb) in pixels.enumerate() {
            target.set_pixel(message.strip, led, Rgb::new(rgb[0], rgb[1], rgb[2]));
        }

        if self.coalescer.take_commit() {
            target.show();
        }
    }

    /// True when no message is partially received
    pub fn is_between_messages(&self) -> bool {
        self.state == DecoderState::IDLE
    }

    pub fn highest_channel_seen(&self) -> u8 {
        self.coalescer.highest_channel_seen()
    }

    /// Messages completed on this connection, applied or discarded
    pub fn messages(&self) -> u64 {
        self.messages
    }
}

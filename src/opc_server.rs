use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::color::{unpack, Rgb, BLACK};
use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionManager, Listener};
use crate::frame_buffer::FrameBuffer;
use crate::opc::{FrameTarget, ProtocolError};
use crate::output::DisplaySink;
use crate::pattern::PatternEngine;
use crate::persist::PersistStore;
use crate::status::{StatusBoard, LINE_FRAME_RATE, LINE_OPC};

const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Runtime configuration changes, applied between loop iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    SetSolidColor(Rgb),
    TestPattern,
    TogglePower,
    /// Re-read the persisted settings
    Reload,
}

/// Push the drawing buffer and keep the frame-rate status line current
fn commit<D: DisplaySink + ?Sized>(frame: &mut FrameBuffer, sink: &mut D, status: &mut StatusBoard) {
    match frame.commit(sink) {
        Ok(Some(rate)) => status.set(LINE_FRAME_RATE, format!("Frame rate: {}", rate)),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "hardware push failed, frame dropped"),
    }
}

/// What the decoder writes through while a client is connected
struct LiveFrame<'a> {
    frame: &'a mut FrameBuffer,
    sink: &'a mut dyn DisplaySink,
    status: &'a mut StatusBoard,
}

impl FrameTarget for LiveFrame<'_> {
    fn set_pixel(&mut self, strip: usize, led: usize, color: Rgb) {
        self.frame.set_pixel(strip, led, color);
    }

    fn show(&mut self) {
        commit(self.frame, self.sink, self.status);
    }

    fn protocol_error(&mut self, error: &ProtocolError) {
        self.status.set(LINE_OPC, error.to_string());
    }
}

/// Periodic throughput log, enabled with `--debug`
struct Stats {
    interval: Duration,
    window_start: Instant,
    messages: u64,
    commits_at_start: u64,
}

/// The controller's cooperative loop.
///
/// Each iteration applies pending control commands, lets the connection
/// manager accept or decode one chunk, and otherwise draws the fallback
/// pattern. Only one of the decoder and the pattern engine writes the frame
/// buffer in any iteration.
pub struct OpcServer<L: Listener, S: DisplaySink> {
    connections: ConnectionManager<L>,
    frame: FrameBuffer,
    sink: S,
    patterns: PatternEngine,
    store: Box<dyn PersistStore>,
    status: StatusBoard,
    commands: Receiver<ControlCommand>,
    command_tx: Sender<ControlCommand>,
    running: Arc<AtomicBool>,
    pattern_interval: Duration,
    next_pattern_frame: Instant,
    stats: Option<Stats>,
}

impl<L: Listener, S: DisplaySink> OpcServer<L, S> {
    pub fn new(
        config: &Config,
        listener: L,
        sink: S,
        mut store: Box<dyn PersistStore>,
        debug: bool,
    ) -> Result<Self> {
        let persisted = store.read()?;
        let (command_tx, commands) = mpsc::channel();
        let now = Instant::now();

        let stats = debug.then(|| Stats {
            interval: Duration::from_secs(config.stats_interval_secs.max(1)),
            window_start: now,
            messages: 0,
            commits_at_start: 0,
        });

        Ok(OpcServer {
            connections: ConnectionManager::new(listener, config.layout),
            frame: FrameBuffer::new(&config.layout),
            sink,
            patterns: PatternEngine::new(&persisted),
            store,
            status: StatusBoard::default(),
            commands,
            command_tx,
            running: Arc::new(AtomicBool::new(true)),
            pattern_interval: Duration::from_secs(1) / config.pattern_fps.max(1),
            next_pattern_frame: now,
            stats,
        })
    }

    /// Get a clone of the running flag for signal handlers
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn command_sender(&self) -> Sender<ControlCommand> {
        self.command_tx.clone()
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Run until the running flag is cleared
    pub fn run(&mut self) {
        info!("waiting for OPC client connection");
        while self.running.load(Ordering::Relaxed) {
            if self.tick(Instant::now()) == ConnectionEvent::Idle {
                thread::sleep(IDLE_SLEEP);
            }
        }
    }

    /// One iteration of the control loop
    pub fn tick(&mut self, now: Instant) -> ConnectionEvent {
        self.apply_commands();

        let event = {
            let mut target = LiveFrame {
                frame: &mut self.frame,
                sink: &mut self.sink,
                status: &mut self.status,
            };
            self.connections.poll(&mut target)
        };

        match &event {
            ConnectionEvent::Connected(_) => self.status.set(LINE_OPC, "OpenPixel Connected"),
            ConnectionEvent::Disconnected => {
                self.status.set(LINE_OPC, "");
                self.next_pattern_frame = now;
            }
            ConnectionEvent::Data { messages, .. } => {
                if let Some(stats) = &mut self.stats {
                    stats.messages += *messages as u64;
                }
            }
            ConnectionEvent::Idle => {}
        }

        if !self.connections.is_client_connected() && now >= self.next_pattern_frame {
            self.patterns.render(&mut self.frame);
            commit(&mut self.frame, &mut self.sink, &mut self.status);
            // Skip the backlog rather than catching up
            self.next_pattern_frame = (self.next_pattern_frame + self.pattern_interval).max(now);
        }

        self.log_stats(now);
        event
    }

    fn apply_commands(&mut self) {
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            };
            debug!(?command, "applying control command");

            match command {
                ControlCommand::SetSolidColor(color) => self.patterns.set_solid_color(color),
                ControlCommand::TestPattern => self.patterns.test_pattern(),
                ControlCommand::TogglePower => {
                    let on = self.frame.toggle_power();
                    info!(on, "power toggled");
                }
                ControlCommand::Reload => match self.store.read() {
                    Ok(persisted) => self.patterns.load(&persisted),
                    Err(e) => warn!(error = %e, "failed to reload persisted settings"),
                },
            }
        }
    }

    fn log_stats(&mut self, now: Instant) {
        let Some(stats) = &mut self.stats else {
            return;
        };
        let elapsed = now.saturating_duration_since(stats.window_start);
        if elapsed < stats.interval {
            return;
        }

        let secs = elapsed.as_secs_f64();
        let commits = self.frame.commit_count();
        info!(
            "[Stats] Received: {:.1} msg/s, Committed: {:.1} fps, last window {} fps",
            stats.messages as f64 / secs,
            (commits - stats.commits_at_start) as f64 / secs,
            self.frame.frame_rate()
        );
        stats.window_start = now;
        stats.messages = 0;
        stats.commits_at_start = commits;
    }

    /// Drop any client and turn the strips off
    pub fn shutdown(&mut self) {
        info!("turning off LEDs");
        self.connections.disconnect();
        self.frame.fill(unpack(BLACK));
        commit(&mut self.frame, &mut self.sink, &mut self.status);
    }

    #[cfg(test)]
    fn sink(&self) -> &S {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{pack, BLUE, PINK, RED};
    use crate::config::LayoutConfig;
    use crate::connection::testing::FakeListener;
    use crate::opc::MessageHeader;
    use crate::output::RecordingSink;
    use crate::pattern::Pattern;
    use crate::persist::PersistConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MemoryStore(Rc<RefCell<PersistConfig>>);

    impl PersistStore for MemoryStore {
        fn read(&mut self) -> Result<PersistConfig> {
            Ok(self.0.borrow().clone())
        }

        fn write(&mut self, config: &PersistConfig) -> Result<()> {
            *self.0.borrow_mut() = config.clone();
            Ok(())
        }
    }

    fn config() -> Config {
        let mut config: Config = serde_json::from_str("{}").unwrap();
        config.layout = LayoutConfig {
            strips: 3,
            leds_per_strip: 4,
        };
        config.pattern_fps = 10;
        config
    }

    fn server(listener: &FakeListener, store: &MemoryStore) -> OpcServer<FakeListener, RecordingSink> {
        OpcServer::new(
            &config(),
            listener.clone(),
            RecordingSink::default(),
            Box::new(store.clone()),
            true,
        )
        .unwrap()
    }

    fn message(channel: u8, command: u8, payload: &[u8]) -> Vec<u8> {
        let header = MessageHeader {
            channel,
            command,
            length: payload.len() as u16,
        };
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_pattern_runs_at_configured_rate_without_client() {
        let listener = FakeListener::default();
        let mut server = server(&listener, &MemoryStore::default());
        let start = Instant::now();
        server.next_pattern_frame = start;

        server.tick(start);
        assert_eq!(server.sink().frames.len(), 1);
        server.tick(start + Duration::from_millis(50));
        assert_eq!(server.sink().frames.len(), 1);
        server.tick(start + Duration::from_millis(100));
        assert_eq!(server.sink().frames.len(), 2);

        // Test pattern: red ramp
        assert_eq!(server.sink().frames[0][0], 0x000000);
        assert_eq!(server.sink().frames[1][0], 0x010000);
    }

    #[test]
    fn test_client_gates_pattern_and_drives_frames() {
        let listener = FakeListener::default();
        let mut server = server(&listener, &MemoryStore::default());
        let start = Instant::now();
        server.tick(start);

        let wire = listener.connect("lab");
        let event = server.tick(start + Duration::from_millis(1));
        assert_eq!(event, ConnectionEvent::Connected("lab".to_string()));
        assert_eq!(server.status().line(LINE_OPC), "OpenPixel Connected");

        // Pattern stays quiet while the client is connected
        for i in 1..5 {
            server.tick(start + Duration::from_secs(i));
        }
        assert_eq!(server.sink().frames.len(), 1);

        wire.send(&message(2, 0, &[255, 0, 0, 0, 0, 255]));
        server.tick(start + Duration::from_secs(6));
        let frames = &server.sink().frames;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1][4], RED);
        assert_eq!(frames[1][5], BLUE);

        wire.close();
        server.tick(start + Duration::from_secs(7));
        assert_eq!(server.tick(start + Duration::from_secs(8)), ConnectionEvent::Disconnected);
        assert_eq!(server.status().line(LINE_OPC), "");
        // Pattern resumes right away
        assert_eq!(server.sink().frames.len(), 3);
    }

    #[test]
    fn test_protocol_error_reaches_status_line() {
        let listener = FakeListener::default();
        let mut server = server(&listener, &MemoryStore::default());
        let start = Instant::now();
        let wire = listener.connect("lab");
        server.tick(start);

        wire.send(&message(1, 5, &[1, 2, 3]));
        server.tick(start);
        assert_eq!(server.status().line(LINE_OPC), "OPC BAD CMD 5");

        wire.send(&message(4, 0, &[]));
        server.tick(start);
        assert_eq!(server.status().line(LINE_OPC), "OPC BAD CHAN 4");
    }

    #[test]
    fn test_control_commands() {
        let listener = FakeListener::default();
        let store = MemoryStore::default();
        let mut server = server(&listener, &store);
        let commands = server.command_sender();
        let start = Instant::now();

        commands.send(ControlCommand::SetSolidColor(unpack(PINK))).unwrap();
        server.tick(start);
        assert!(server.sink().frames[0].iter().all(|&p| p == PINK));

        commands.send(ControlCommand::TogglePower).unwrap();
        server.tick(start + Duration::from_millis(100));
        assert!(server.sink().frames[1].iter().all(|&p| p == BLACK));
        commands.send(ControlCommand::TogglePower).unwrap();

        store
            .clone()
            .write(&PersistConfig {
                pattern: Pattern::Solid,
                solid_color: BLUE,
            })
            .unwrap();
        commands.send(ControlCommand::Reload).unwrap();
        server.tick(start + Duration::from_millis(200));
        assert!(server.sink().frames[2].iter().all(|&p| p == BLUE));

        commands.send(ControlCommand::TestPattern).unwrap();
        server.tick(start + Duration::from_millis(300));
        assert_eq!(server.sink().frames[3][0], pack(Rgb::new(0, 0, 0)));
    }

    #[test]
    fn test_shutdown_blanks_strips() {
        let listener = FakeListener::default();
        let mut server = server(&listener, &MemoryStore::default());
        server.command_sender().send(ControlCommand::SetSolidColor(unpack(RED))).unwrap();
        server.tick(Instant::now());

        server.shutdown();
        let last = server.sink().frames.last().unwrap();
        assert!(last.iter().all(|&p| p == BLACK));
    }

    #[test]
    fn test_failed_push_does_not_stop_loop() {
        let listener = FakeListener::default();
        let mut server = server(&listener, &MemoryStore::default());
        server.sink.fail = true;
        let start = Instant::now();
        server.tick(start);
        server.tick(start + Duration::from_millis(100));

        server.sink.fail = false;
        server.tick(start + Duration::from_millis(200));
        assert_eq!(server.sink().frames.len(), 1);
    }
}

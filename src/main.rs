use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use branch_controller::color::parse_color;
use branch_controller::config::Config;
use branch_controller::connection::TcpOpcListener;
use branch_controller::opc_server::{ControlCommand, OpcServer};
use branch_controller::output::{DisplaySink, NullSink, SerialSink};
use branch_controller::persist::JsonFileStore;

#[derive(Parser)]
#[command(name = "branch_controller")]
#[command(about = "LED branch controller\n\nReceives OPC data over TCP and drives parallel LED strips.", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: PathBuf,

    /// Enable debug output (statistics)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps of every message)
    #[arg(long)]
    ddebug: bool,

    /// Start with a solid color: #RRGGBB, hsl:H,S,L or a name like "pink"
    #[arg(long, value_parser = parse_color, conflicts_with = "test_pattern")]
    color: Option<branch_controller::color::Rgb>,

    /// Start with the test pattern
    #[arg(long)]
    test_pattern: bool,
}

fn init_logging(debug: bool, ddebug: bool) {
    let default_level = if ddebug {
        "trace"
    } else if debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    let debug = cli.debug || cli.ddebug;
    init_logging(debug, cli.ddebug);

    let config = Config::load(&cli.config)?;

    let sink: Box<dyn DisplaySink> = if config.outputs.is_empty() {
        warn!("no outputs configured, frames go nowhere");
        Box::new(NullSink)
    } else {
        let serial = SerialSink::open(&config.outputs);
        if serial.output_count() == 0 {
            warn!("no outputs could be opened, frames go nowhere");
        }
        Box::new(serial)
    };

    let addr = format!("{}:{}", config.opc.host, config.opc.port);
    let listener = TcpOpcListener::bind(&addr)?;
    info!(%addr, strips = config.layout.strips, leds_per_strip = config.layout.leds_per_strip, "OPC server listening");

    let store = Box::new(JsonFileStore::new(&config.persist_path));
    let mut server = OpcServer::new(&config, listener, sink, store, debug)?;

    let commands = server.command_sender();
    if let Some(color) = cli.color {
        commands.send(ControlCommand::SetSolidColor(color))?;
    } else if cli.test_pattern {
        commands.send(ControlCommand::TestPattern)?;
    }

    // Set up Ctrl-C handler with graceful shutdown
    let running = server.get_running_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::Relaxed);
    }) {
        warn!(error = %e, "could not set Ctrl-C handler");
    }

    server.run();

    // Graceful shutdown - send black frames to turn off LEDs
    info!("shutting down");
    server.shutdown();

    Ok(())
}

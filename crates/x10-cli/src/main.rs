//! x10 - command-line control of a CM11A bridge
//!
//! This binary opens the bridge's serial port and:
//! - Transmits addresses and functions, reporting whether each was delivered
//! - Sets the bridge clock and resets its timers
//! - Prints power-line traffic as JSON lines until interrupted

mod commands;
mod events;

use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use x10_cm11a::{Cm11a, Cm11aConfig, X10Transport};
use x10_core::{HouseCode, X10Event};

#[derive(Parser)]
#[command(name = "x10")]
#[command(about = "Control X10 devices through a CM11A bridge")]
struct Args {
    /// JSON configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Serial port (overrides the configuration file)
    #[arg(long, short)]
    port: Option<PathBuf>,

    /// Attempts per delivery (overrides the configuration file)
    #[arg(long)]
    attempts: Option<u32>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transmit events in order, e.g. `A1 A:on A:dim:0.25`
    Send {
        /// Events to transmit
        #[arg(required = true, value_parser = events::parse_event)]
        events: Vec<X10Event>,
    },

    /// Set the bridge clock
    Clock {
        /// Local time to set, `YYYY-MM-DD HH:MM:SS` (default: now)
        #[arg(long, value_parser = events::parse_time)]
        time: Option<NaiveDateTime>,

        /// Change the monitored house code (also clears monitoring data)
        #[arg(long)]
        house: Option<HouseCode>,

        /// Reset the battery-use timer
        #[arg(long)]
        reset_battery: bool,

        /// Clear monitored status data
        #[arg(long)]
        reset_monitor: bool,

        /// Purge timers and macros
        #[arg(long)]
        purge_macros: bool,
    },

    /// Print received events as JSON lines
    Monitor {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so monitor output stays machine-readable
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args)?;
    info!("Opening CM11A on {}", config.serial.port.display());
    let transport = open_transport(&config).await?;
    let cm11a = Cm11a::new(transport, &config)?;
    let result = run(&cm11a, args.command).await;
    cm11a.close().await;
    result
}

#[cfg(feature = "serial")]
async fn open_transport(config: &Cm11aConfig) -> anyhow::Result<x10_cm11a::SerialTransport> {
    Ok(x10_cm11a::SerialTransport::open(config).await?)
}

#[cfg(not(feature = "serial"))]
async fn open_transport(
    _config: &Cm11aConfig,
) -> anyhow::Result<x10_cm11a::test_utils::ScriptedTransport> {
    anyhow::bail!("built without serial support; rebuild with `--features serial`")
}

async fn run<T: X10Transport + 'static>(cm11a: &Cm11a<T>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Send { events } => commands::send(cm11a, events).await,
        Command::Clock {
            time,
            house,
            reset_battery,
            reset_monitor,
            purge_macros,
        } => {
            commands::clock(cm11a, time, house, reset_battery, reset_monitor, purge_macros).await
        }
        Command::Monitor { seconds } => {
            commands::monitor(cm11a, seconds.map(Duration::from_secs)).await
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<Cm11aConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Cm11aConfig::default(),
    };
    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(attempts) = args.attempts {
        config.maximum_attempts = attempts;
    }
    config.validate()?;
    Ok(config)
}

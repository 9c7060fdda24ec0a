//! vcap host - command line entry point
//!
//! Usage:
//!     vcap-host capsules
//!     vcap-host run --capsules face_detector --options '{"face_detector": {"threshold": 0.8}}'
//!     vcap-host replay --snapshots frames.json --config host.json
//!     vcap-host distancing --snapshots frames.json --zone Lobby --min-distance 100
//!     vcap-host monitor --config host.json < frames.ndjson

mod commands;
mod config;
mod logging;
mod predictor;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::HostConfig;
use crate::logging::prefix::PULSE_OPEN;

#[derive(Parser, Debug)]
#[command(name = "vcap-host")]
#[command(about = "Run capsule pipelines and zone alarms")]
#[command(version)]
struct Args {
    /// Host configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level for vcap crates (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the loaded capsules
    Capsules,

    /// Run a set of capsules over a blank frame
    Run {
        /// Comma-separated capsule names
        #[arg(long)]
        capsules: String,

        /// Option overrides as JSON: {"capsule": {"option": value}}
        #[arg(long)]
        options: Option<String>,

        #[arg(long, default_value = "640")]
        width: u32,

        #[arg(long, default_value = "480")]
        height: u32,
    },

    /// Evaluate zone alarms over a JSON array of snapshots
    Replay {
        #[arg(long)]
        snapshots: PathBuf,

        /// Only report completed alerts at least this long (seconds)
        #[arg(long, default_value = "0")]
        min_duration: f64,
    },

    /// Report detections in a zone that are too close together
    Distancing {
        #[arg(long)]
        snapshots: PathBuf,

        #[arg(long)]
        zone: String,

        #[arg(long, default_value = "100")]
        min_distance: f64,
    },

    /// Evaluate zone alarms over newline-delimited snapshots on stdin
    Monitor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(&args.log_level)?;

    info!("{} vcap-host v{}", PULSE_OPEN, env!("CARGO_PKG_VERSION"));
    let config = HostConfig::load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Capsules => commands::capsules(&config).await,
        Command::Run {
            capsules,
            options,
            width,
            height,
        } => commands::run(&config, &capsules, options.as_deref(), width, height).await,
        Command::Replay {
            snapshots,
            min_duration,
        } => commands::replay(&config, &snapshots, min_duration),
        Command::Distancing {
            snapshots,
            zone,
            min_distance,
        } => commands::distancing(&config, &snapshots, &zone, min_distance),
        Command::Monitor => commands::monitor(&config).await,
    }
}

//! # Junction Controller Daemon
//!
//! Adaptive traffic-signal controller for a single road junction.
//!
//! # Usage
//!
//! ```bash
//! # Run against a junction configuration
//! junctiond --config config/junction.yaml
//!
//! # Watcher debug windows and verbose logging
//! junctiond -c config/junction.yaml -d -v
//! ```

use clap::Parser;
use junction_common::config::JunctionConfig;
use junction_vision::RenderMode;
use junctiond::supervisor::{Supervisor, SupervisorError};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Adaptive junction signal controller
#[derive(Parser, Debug)]
#[command(name = "junctiond")]
#[command(version)]
#[command(about = "Adaptive traffic-signal controller for a single junction")]
#[command(long_about = None)]
struct Args {
    /// Path to the junction configuration file (YAML)
    #[arg(short, long, default_value = "/etc/junction/junction.yaml")]
    config: PathBuf,

    /// Open watcher debug windows instead of running headless
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("junction controller failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SupervisorError> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("junctiond v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = JunctionConfig::load(&args.config)?;
    let render = if args.debug {
        RenderMode::Gui
    } else {
        RenderMode::Headless
    };

    Supervisor::new(config, render).run()
}

/// Setup tracing subscriber based on CLI arguments
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

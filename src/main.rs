// SPDX-License-Identifier: GPL-3.0-only

use camera_session::Geometry;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a camera capture session from the command line")]
#[command(version = camera_session::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered pipeline backends
    Backends,

    /// Run a capture session and print its notifications
    Run {
        /// Configuration file (default: ~/.config/camera-session/config.json)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Backend to use instead of the configured one
        #[arg(short, long)]
        backend: Option<String>,

        /// Run duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        /// Change to this resolution once playing, e.g. 640x480
        #[arg(short, long, value_parser = cli::parse_geometry)]
        resolution: Option<Geometry>,

        /// White balance mode name, e.g. daylight or cloudy-daylight
        #[arg(short, long)]
        white_balance: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backends => cli::list_backends(),
        Commands::Run {
            config,
            backend,
            duration,
            resolution,
            white_balance,
        } => cli::run_session(cli::RunOptions {
            config,
            backend,
            duration,
            resolution,
            white_balance,
        }),
    }
}

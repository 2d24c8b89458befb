// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for capture sessions
//!
//! This module provides command-line functionality for:
//! - Listing the registered pipeline backends
//! - Running a session end to end and printing its notifications

use camera_session::backends;
use camera_session::constants::{WhiteBalanceMode, timing};
use camera_session::session::dispatch::{ChannelSink, Notification};
use camera_session::session::surface::{PassthroughSurfaces, SurfaceToken};
use camera_session::{Config, Geometry, PipelineState, SessionHandle};
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Token handed to the passthrough provider in place of a real window
const CLI_SURFACE_TOKEN: SurfaceToken = SurfaceToken(0x1);

/// Options for [`run_session`]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub backend: Option<String>,
    pub duration: u64,
    pub resolution: Option<Geometry>,
    pub white_balance: Option<String>,
}

/// Parse `WIDTHxHEIGHT`
pub fn parse_geometry(value: &str) -> Result<Geometry, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {}", value))?;
    let width: u32 = width.trim().parse().map_err(|e| format!("width: {}", e))?;
    let height: u32 = height.trim().parse().map_err(|e| format!("height: {}", e))?;
    if width == 0 || height == 0 {
        return Err("geometry must be non-zero".to_string());
    }
    Ok(Geometry { width, height })
}

/// List registered backends and whether they can run here
pub fn list_backends() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default()?;

    println!("Available backends:");
    println!();
    for name in backends::available() {
        let status = match backends::lookup(name).and_then(|b| b.probe(&config)) {
            Ok(()) => "ready".to_string(),
            Err(e) => format!("unavailable ({})", e),
        };
        let marker = if name == config.backend { "*" } else { " " };
        println!(" {} {:<12} {}", marker, name, status);
    }

    Ok(())
}

/// Start a session, optionally reconfigure it, and stop after a duration
pub fn run_session(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &options.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    if let Some(backend) = options.backend {
        config.backend = backend;
    }
    let auto_play = config.auto_play;

    println!("Starting session on backend '{}'", config.backend);
    let (sink, notifications) = ChannelSink::new();
    let session = SessionHandle::start(config, Arc::new(sink), Arc::new(PassthroughSurfaces))?;
    session.inject_surface(CLI_SURFACE_TOKEN);

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Running... (press Ctrl+C to stop early)");
    let start = Instant::now();
    let target_duration = Duration::from_secs(options.duration);
    let mut pending_resolution = options.resolution;

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }

        let notification = match notifications.recv_timeout(timing::CLI_POLL_INTERVAL) {
            Ok(notification) => notification,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match notification {
            Notification::Initialized => {
                println!("Session initialized");
                if let Some(name) = &options.white_balance {
                    session.set_white_balance(WhiteBalanceMode::from_name(name));
                }
                if auto_play {
                    session.request_play();
                }
            }
            Notification::StateChanged(state) => {
                println!("State: {}", state);
                if state == PipelineState::Playing
                    && let Some(geometry) = pending_resolution.take()
                {
                    println!("Changing resolution to {}x{}", geometry.width, geometry.height);
                    session.change_resolution(geometry.width, geometry.height);
                }
            }
            Notification::Error(message) => {
                eprintln!("Error: {}", message);
            }
        }
    }

    session.stop();
    println!("Session stopped (last state: {})", session.state());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geometry() {
        assert_eq!(
            parse_geometry("640x480"),
            Ok(Geometry {
                width: 640,
                height: 480
            })
        );
        assert!(parse_geometry("640").is_err());
        assert!(parse_geometry("0x480").is_err());
        assert!(parse_geometry("axb").is_err());
    }
}

// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{config_file, pipeline, timing};
use crate::errors::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Output geometry requested for the format filter stage
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// Session configuration
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Registered backend name ("simulated", "gstreamer")
    pub backend: String,
    /// Capture element factory used by the GStreamer backend
    pub source_element: String,
    /// Rendering element factory used by the GStreamer backend
    pub sink_element: String,
    /// Output geometry applied once the pipeline exists
    pub initial_geometry: Option<Geometry>,
    /// Wait for the NULL confirmation after a pipeline error
    pub error_stop_timeout_ms: u64,
    /// Request PLAYING as soon as the session reports initialized
    pub auto_play: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: "simulated".to_string(),
            source_element: pipeline::DEFAULT_SOURCE_ELEMENT.to_string(),
            sink_element: pipeline::DEFAULT_SINK_ELEMENT.to_string(),
            initial_geometry: None,
            error_stop_timeout_ms: timing::ERROR_STOP_TIMEOUT_MS,
            auto_play: true,
        }
    }
}

impl Config {
    /// Default location: `<config dir>/camera-session/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(config_file::DIR_NAME).join(config_file::FILE_NAME))
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> SessionResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;

        info!(path = %path.display(), backend = %config.backend, "Loaded config");
        Ok(config)
    }

    pub fn load_or_default() -> SessionResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> SessionResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.backend.is_empty() {
            return Err(SessionError::Config("backend name is empty".into()));
        }
        if self.source_element.is_empty() || self.sink_element.is_empty() {
            return Err(SessionError::Config("element name is empty".into()));
        }
        if let Some(geometry) = self.initial_geometry
            && (geometry.width == 0 || geometry.height == 0)
        {
            return Err(SessionError::Config(format!(
                "invalid geometry {}x{}",
                geometry.width, geometry.height
            )));
        }
        Ok(())
    }

    pub fn error_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.error_stop_timeout_ms)
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   SessionHandle     │  ← host thread
//! └──────────┬──────────┘
//!            │ commands
//!            ▼
//! ┌─────────────────────┐
//! │     Event loop      │  ← worker thread, owns the controller
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ PipelineController  │  ← common interface
//! └──────────┬──────────┘
//!            │
//!       ┌────┴──────┐
//!       ▼           ▼
//!  ┌─────────┐ ┌─────────┐
//!  │Simulated│ │GStreamer│
//!  └─────────┘ └─────────┘
//! ```

pub mod simulated;

#[cfg(feature = "gstreamer")]
pub mod gstreamer;

use crate::config::Config;
use crate::constants::{RotateMethod, WhiteBalanceMode};
use crate::errors::{InitError, PipelineError};
use crate::session::state::{PipelineEvent, PipelineState};
use crate::session::surface::RawSurface;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Channel end a controller posts its events into
pub type EventSender = crossbeam_channel::Sender<PipelineEvent>;

/// An already-constructed processing graph
///
/// Controllers are shared between the worker thread (state requests) and the
/// host thread (surface binding and parameter setters), so every method takes
/// `&self`.
pub trait PipelineController: Send + Sync {
    /// Request a new target state
    ///
    /// The actual transition is reported later as a
    /// [`PipelineEvent::StateChanged`] from the pipeline origin.
    fn set_target_state(&self, state: PipelineState) -> Result<(), PipelineError>;

    /// Constrain the output geometry of the format filter stage
    fn set_output_geometry(&self, width: u32, height: u32) -> Result<(), PipelineError>;

    /// Point the rendering stage at a surface, or detach it with `None`
    fn bind_surface(&self, surface: Option<RawSurface>) -> Result<(), PipelineError>;

    fn set_white_balance(&self, mode: WhiteBalanceMode) -> Result<(), PipelineError>;

    fn set_auto_focus(&self, enabled: bool) -> Result<(), PipelineError>;

    fn set_rotation(&self, method: RotateMethod) -> Result<(), PipelineError>;
}

/// Factory for pipeline controllers
pub trait PipelineBackend: Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Cheap availability check, run synchronously on the starting thread
    fn probe(&self, config: &Config) -> Result<(), InitError>;

    /// Construct the graph; runs on the session worker thread
    fn build(
        &self,
        config: &Config,
        events: EventSender,
    ) -> Result<Arc<dyn PipelineController>, InitError>;
}

type BackendConstructor = fn() -> Arc<dyn PipelineBackend>;

/// Process-wide backend table, built once on first use
static REGISTRY: OnceLock<Vec<(&'static str, BackendConstructor)>> = OnceLock::new();

fn registry() -> &'static [(&'static str, BackendConstructor)] {
    REGISTRY.get_or_init(|| {
        let mut table: Vec<(&'static str, BackendConstructor)> = Vec::new();
        table.push((simulated::BACKEND_NAME, simulated::construct));

        #[cfg(feature = "gstreamer")]
        table.push((gstreamer::BACKEND_NAME, gstreamer::construct));

        debug!(count = table.len(), "Backend registry initialized");
        table
    })
}

/// Instantiate the backend registered under `name`
pub fn lookup(name: &str) -> Result<Arc<dyn PipelineBackend>, InitError> {
    registry()
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, construct)| construct())
        .ok_or_else(|| InitError::UnknownBackend(name.to_string()))
}

/// Names of all registered backends
pub fn available() -> Vec<&'static str> {
    registry().iter().map(|(name, _)| *name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_backend_is_always_registered() {
        assert!(available().contains(&"simulated"));
        assert_eq!(lookup("simulated").map(|b| b.name()).ok(), Some("simulated"));
    }

    #[test]
    fn test_unknown_backend_is_an_init_error() {
        assert!(matches!(
            lookup("nonexistent"),
            Err(InitError::UnknownBackend(name)) if name == "nonexistent"
        ));
    }
}

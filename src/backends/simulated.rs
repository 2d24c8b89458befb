// SPDX-License-Identifier: GPL-3.0-only

//! In-process pipeline with media-graph lifecycle semantics
//!
//! The simulated graph walks one state at a time toward each requested
//! target and reports every step, first from each of its stages and then
//! from the top-level pipeline, the same way a real graph does. It is the
//! default backend and the one the test-suite drives through
//! [`SimulatedProbe`].

use super::{EventSender, PipelineBackend, PipelineController};
use crate::config::Config;
use crate::constants::{RotateMethod, WhiteBalanceMode, pipeline};
use crate::errors::{InitError, PipelineError};
use crate::session::state::{EventOrigin, PipelineEvent, PipelineState};
use crate::session::surface::RawSurface;
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub const BACKEND_NAME: &str = "simulated";

const STAGES: [&str; 3] = [
    pipeline::SOURCE_NAME,
    pipeline::FILTER_NAME,
    pipeline::SINK_NAME,
];

pub(super) fn construct() -> Arc<dyn PipelineBackend> {
    Arc::new(SimulatedBackend::new())
}

/// Everything the simulated graph has been asked to do
#[derive(Debug, Default)]
struct Recorded {
    state: PipelineState,
    requests: Vec<PipelineState>,
    geometry: Option<(u32, u32)>,
    bound: Option<RawSurface>,
    bind_history: Vec<Option<RawSurface>>,
    white_balance: Option<WhiteBalanceMode>,
    auto_focus: Option<bool>,
    rotation: Option<RotateMethod>,
    builds: usize,
    torn_down: bool,
}

#[derive(Default)]
struct SimShared {
    recorded: Mutex<Recorded>,
    events: Mutex<Option<EventSender>>,
}

impl SimShared {
    fn post(&self, event: PipelineEvent) {
        match self.events.lock().unwrap().as_ref() {
            Some(sender) => {
                if sender.send(event).is_err() {
                    debug!("Event loop gone, dropping simulated event");
                }
            }
            None => warn!("Simulated pipeline not built, dropping event"),
        }
    }
}

/// Simulated backend
///
/// Cloning shares the recorded history; every session built from the same
/// backend reports into the same [`SimulatedProbe`].
#[derive(Clone, Default)]
pub struct SimulatedBackend {
    shared: Arc<SimShared>,
    unavailable: bool,
    fail_build: bool,
    refused_state: Option<PipelineState>,
    gate: Option<Receiver<()>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `probe` fail, as if the platform lacked the capture stack
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Make graph construction fail on the worker thread
    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    /// Refuse any request for `state`
    pub fn refusing(mut self, state: PipelineState) -> Self {
        self.refused_state = Some(state);
        self
    }

    /// Hold graph construction until the returned gate is opened or dropped
    pub fn gated(mut self) -> (Self, BuildGate) {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        self.gate = Some(receiver);
        (self, BuildGate(sender))
    }

    pub fn probe_handle(&self) -> SimulatedProbe {
        SimulatedProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl PipelineBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn probe(&self, _config: &Config) -> Result<(), InitError> {
        if self.unavailable {
            return Err(InitError::BackendUnavailable(
                "simulated capture stack disabled".into(),
            ));
        }
        Ok(())
    }

    fn build(
        &self,
        _config: &Config,
        events: EventSender,
    ) -> Result<Arc<dyn PipelineController>, InitError> {
        if let Some(gate) = &self.gate {
            debug!("Waiting for build gate");
            let _ = gate.recv();
        }
        if self.fail_build {
            return Err(InitError::PipelineConstruction(
                "simulated stage failed to link".into(),
            ));
        }

        {
            let mut recorded = self.shared.recorded.lock().unwrap();
            *recorded = Recorded {
                builds: recorded.builds + 1,
                ..Default::default()
            };
        }
        *self.shared.events.lock().unwrap() = Some(events);

        info!(name = pipeline::PIPELINE_NAME, "Simulated pipeline created");
        Ok(Arc::new(SimulatedPipeline {
            shared: Arc::clone(&self.shared),
            refused_state: self.refused_state,
        }))
    }
}

/// Releases a gated build
pub struct BuildGate(Sender<()>);

impl BuildGate {
    pub fn open(self) {
        let _ = self.0.send(());
    }
}

struct SimulatedPipeline {
    shared: Arc<SimShared>,
    refused_state: Option<PipelineState>,
}

impl PipelineController for SimulatedPipeline {
    fn set_target_state(&self, target: PipelineState) -> Result<(), PipelineError> {
        let mut recorded = self.shared.recorded.lock().unwrap();
        recorded.requests.push(target);

        if self.refused_state == Some(target) {
            return Err(PipelineError::state_change_failed(
                pipeline::PIPELINE_NAME,
                target,
            ));
        }

        while let Some(next) = recorded.state.step_toward(target) {
            let old = recorded.state;
            let pending = (next != target).then_some(target);
            for stage in STAGES {
                self.shared.post(PipelineEvent::StateChanged {
                    origin: EventOrigin::Stage(stage.to_string()),
                    old,
                    new: next,
                    pending,
                });
            }
            self.shared.post(PipelineEvent::StateChanged {
                origin: EventOrigin::Pipeline,
                old,
                new: next,
                pending,
            });
            recorded.state = next;
        }
        Ok(())
    }

    fn set_output_geometry(&self, width: u32, height: u32) -> Result<(), PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::new(
                pipeline::FILTER_NAME,
                format!("invalid geometry {}x{}", width, height),
            ));
        }
        self.shared.recorded.lock().unwrap().geometry = Some((width, height));
        Ok(())
    }

    fn bind_surface(&self, surface: Option<RawSurface>) -> Result<(), PipelineError> {
        let mut recorded = self.shared.recorded.lock().unwrap();
        recorded.bound = surface;
        recorded.bind_history.push(surface);
        Ok(())
    }

    fn set_white_balance(&self, mode: WhiteBalanceMode) -> Result<(), PipelineError> {
        self.shared.recorded.lock().unwrap().white_balance = Some(mode);
        Ok(())
    }

    fn set_auto_focus(&self, enabled: bool) -> Result<(), PipelineError> {
        self.shared.recorded.lock().unwrap().auto_focus = Some(enabled);
        Ok(())
    }

    fn set_rotation(&self, method: RotateMethod) -> Result<(), PipelineError> {
        self.shared.recorded.lock().unwrap().rotation = Some(method);
        Ok(())
    }
}

impl Drop for SimulatedPipeline {
    fn drop(&mut self) {
        debug!("Dropping simulated pipeline");
        self.shared.recorded.lock().unwrap().torn_down = true;
    }
}

/// Test-side view into a simulated graph
#[derive(Clone)]
pub struct SimulatedProbe {
    shared: Arc<SimShared>,
}

impl SimulatedProbe {
    /// Report a stage failure, as the graph would
    pub fn inject_error(&self, source: &str, message: &str) {
        self.shared.post(PipelineEvent::Error {
            source: source.to_string(),
            message: message.to_string(),
        });
    }

    pub fn inject_end_of_stream(&self) {
        self.shared.post(PipelineEvent::EndOfStream);
    }

    /// Actual state of the graph (not the session's recorded state)
    pub fn state(&self) -> PipelineState {
        self.shared.recorded.lock().unwrap().state
    }

    pub fn requests(&self) -> Vec<PipelineState> {
        self.shared.recorded.lock().unwrap().requests.clone()
    }

    pub fn geometry(&self) -> Option<(u32, u32)> {
        self.shared.recorded.lock().unwrap().geometry
    }

    pub fn bound_surface(&self) -> Option<RawSurface> {
        self.shared.recorded.lock().unwrap().bound
    }

    pub fn bind_history(&self) -> Vec<Option<RawSurface>> {
        self.shared.recorded.lock().unwrap().bind_history.clone()
    }

    pub fn white_balance(&self) -> Option<WhiteBalanceMode> {
        self.shared.recorded.lock().unwrap().white_balance
    }

    pub fn auto_focus(&self) -> Option<bool> {
        self.shared.recorded.lock().unwrap().auto_focus
    }

    pub fn rotation(&self) -> Option<RotateMethod> {
        self.shared.recorded.lock().unwrap().rotation
    }

    pub fn builds(&self) -> usize {
        self.shared.recorded.lock().unwrap().builds
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.recorded.lock().unwrap().torn_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> (Arc<dyn PipelineController>, Receiver<PipelineEvent>, SimulatedProbe) {
        let backend = SimulatedBackend::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let controller = backend.build(&Config::default(), tx).unwrap();
        (controller, rx, backend.probe_handle())
    }

    fn pipeline_states(rx: &Receiver<PipelineEvent>) -> Vec<PipelineState> {
        rx.try_iter()
            .filter_map(|event| match event {
                PipelineEvent::StateChanged {
                    origin: EventOrigin::Pipeline,
                    new,
                    ..
                } => Some(new),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_transitions_step_through_intermediate_states() {
        let (controller, rx, probe) = build();
        controller.set_target_state(PipelineState::Playing).unwrap();

        assert_eq!(
            pipeline_states(&rx),
            vec![
                PipelineState::Ready,
                PipelineState::Paused,
                PipelineState::Playing
            ]
        );
        assert_eq!(probe.state(), PipelineState::Playing);
    }

    #[test]
    fn test_stage_events_precede_pipeline_event() {
        let (controller, rx, _probe) = build();
        controller.set_target_state(PipelineState::Ready).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), STAGES.len() + 1);
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::StateChanged {
                origin: EventOrigin::Pipeline,
                pending: None,
                ..
            })
        ));
    }

    #[test]
    fn test_refused_state_reports_failure() {
        let backend = SimulatedBackend::new().refusing(PipelineState::Playing);
        let (tx, _rx) = crossbeam_channel::unbounded();
        let controller = backend.build(&Config::default(), tx).unwrap();

        assert!(controller.set_target_state(PipelineState::Playing).is_err());
        assert_eq!(backend.probe_handle().state(), PipelineState::Null);
    }

    #[test]
    fn test_drop_marks_teardown() {
        let (controller, _rx, probe) = build();
        assert!(!probe.is_torn_down());
        drop(controller);
        assert!(probe.is_torn_down());
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline lifecycle states and the events the graph reports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Overall state of the processing graph
///
/// `Null → Ready → Paused ⇄ Playing`, with `Ready` reachable again from
/// `Paused`/`Playing` during reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Null,
    Ready,
    Paused,
    Playing,
}

impl PipelineState {
    pub const ALL: [PipelineState; 4] = [
        PipelineState::Null,
        PipelineState::Ready,
        PipelineState::Paused,
        PipelineState::Playing,
    ];

    /// Next state on the way to `target`, or `None` when already there
    pub fn step_toward(self, target: PipelineState) -> Option<PipelineState> {
        use std::cmp::Ordering::*;
        match self.cmp(&target) {
            Equal => None,
            Less => Some(Self::ALL[self as usize + 1]),
            Greater => Some(Self::ALL[self as usize - 1]),
        }
    }

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(PipelineState::Null)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Null => "NULL",
            PipelineState::Ready => "READY",
            PipelineState::Paused => "PAUSED",
            PipelineState::Playing => "PLAYING",
        };
        f.write_str(name)
    }
}

/// Which object in the graph emitted an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOrigin {
    /// The top-level pipeline
    Pipeline,
    /// An internal stage, by name
    Stage(String),
}

/// Events produced by a pipeline controller and consumed by the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StateChanged {
        origin: EventOrigin,
        old: PipelineState,
        new: PipelineState,
        pending: Option<PipelineState>,
    },
    Error {
        source: String,
        message: String,
    },
    EndOfStream,
}

/// Last confirmed pipeline state, readable from any thread
///
/// Only the worker thread stores into it, and only on confirmation.
#[derive(Debug, Default)]
pub struct RecordedState(AtomicU8);

impl RecordedState {
    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_toward_walks_one_state_at_a_time() {
        assert_eq!(
            PipelineState::Null.step_toward(PipelineState::Playing),
            Some(PipelineState::Ready)
        );
        assert_eq!(
            PipelineState::Playing.step_toward(PipelineState::Ready),
            Some(PipelineState::Paused)
        );
        assert_eq!(PipelineState::Paused.step_toward(PipelineState::Paused), None);
    }

    #[test]
    fn test_recorded_state_defaults_to_null() {
        let recorded = RecordedState::default();
        assert_eq!(recorded.get(), PipelineState::Null);
        recorded.set(PipelineState::Playing);
        assert_eq!(recorded.get(), PipelineState::Playing);
    }
}

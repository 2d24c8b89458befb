// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture session
//!
//! Only [`InitError`] is ever returned to the host as a call failure. The
//! other kinds are reported through the notification sink or absorbed with
//! a log record.

use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Umbrella error for the crate
#[derive(Debug, Clone)]
pub enum SessionError {
    /// Session could not be started
    Init(InitError),
    /// Failure reported by the processing graph
    Pipeline(PipelineError),
    /// Configuration could not be loaded or is invalid
    Config(String),
}

/// Session start failures, surfaced synchronously from `start()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The worker thread could not be created
    ThreadSpawn(String),
    /// The selected backend is not usable on this system
    BackendUnavailable(String),
    /// The processing graph could not be assembled
    PipelineConstruction(String),
    /// No backend is registered under the requested name
    UnknownBackend(String),
    /// The session configuration was rejected
    InvalidConfig(String),
}

/// Asynchronous failure from the processing graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineError {
    /// Name of the stage that reported the failure
    pub source: String,
    /// Human readable description
    pub message: String,
}

impl PipelineError {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }

    /// A state change request the graph refused outright
    pub fn state_change_failed(source: impl Into<String>, target: impl fmt::Display) -> Self {
        Self::new(source, format!("state change to {} failed", target))
    }
}

/// Failure raised while calling into the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The callback reported an error
    Failed(String),
    /// The callback panicked; the panic was caught at the dispatch boundary
    Panicked(String),
    /// The worker thread could not be associated with the host context
    AttachFailed(String),
}

/// Surface acquisition failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The token does not refer to a surface
    InvalidToken(String),
    /// The surface exists but cannot be used right now
    Unavailable(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Init(e) => write!(f, "Session start failed: {}", e),
            SessionError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            SessionError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::ThreadSpawn(msg) => write!(f, "Failed to spawn worker thread: {}", msg),
            InitError::BackendUnavailable(msg) => write!(f, "Backend not available: {}", msg),
            InitError::PipelineConstruction(msg) => {
                write!(f, "Failed to construct pipeline: {}", msg)
            }
            InitError::UnknownBackend(name) => write!(f, "Unknown backend: {}", name),
            InitError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error received from element {}: {}",
            self.source, self.message
        )
    }
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackError::Failed(msg) => write!(f, "Host callback failed: {}", msg),
            CallbackError::Panicked(msg) => write!(f, "Host callback panicked: {}", msg),
            CallbackError::AttachFailed(msg) => {
                write!(f, "Failed to attach worker thread: {}", msg)
            }
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::InvalidToken(msg) => write!(f, "Invalid surface token: {}", msg),
            ResourceError::Unavailable(msg) => write!(f, "Surface unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}
impl std::error::Error for InitError {}
impl std::error::Error for PipelineError {}
impl std::error::Error for CallbackError {}
impl std::error::Error for ResourceError {}

impl From<InitError> for SessionError {
    fn from(err: InitError) -> Self {
        SessionError::Init(err)
    }
}

impl From<PipelineError> for SessionError {
    fn from(err: PipelineError) -> Self {
        SessionError::Pipeline(err)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_message_names_source() {
        let err = PipelineError::new("source", "device busy");
        assert_eq!(
            err.to_string(),
            "Error received from element source: device busy"
        );
    }

    #[test]
    fn test_init_error_converts_into_session_error() {
        let err: SessionError = InitError::UnknownBackend("v4l9".into()).into();
        assert!(matches!(err, SessionError::Init(InitError::UnknownBackend(_))));
        assert!(err.to_string().contains("v4l9"));
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Host-facing session control
//!
//! A session is one run of a capture pipeline on its own worker thread. The
//! host drives it through a [`SessionHandle`]:
//!
//! - state requests (`request_play`, `request_pause`, `reconfigure`) are
//!   queued to the worker and confirmed later through the notification sink
//! - surface injection and retraction happen directly on the calling thread,
//!   serialized by the bridge mutex
//! - `stop` is the only call that blocks
//!
//! Calls made before the pipeline exists, or after the session stopped, are
//! accepted and ignored.

pub mod dispatch;
mod event_loop;
pub mod state;
pub mod surface;

use crate::backends::{self, PipelineBackend, PipelineController};
use crate::config::Config;
use crate::constants::{RotateMethod, WhiteBalanceMode, threads};
use crate::errors::{InitError, PipelineError};
use crossbeam_channel::Sender;
use dispatch::{Dispatcher, NotificationSink};
use event_loop::{Command, WorkerContext};
use state::{PipelineState, RecordedState};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use surface::{SurfaceHandle, SurfaceProvider, SurfaceToken};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one session in logs and thread names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for thread names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cross-thread resources guarded by a single mutex
#[derive(Default)]
pub(crate) struct Bridge {
    pub(crate) surface: Option<SurfaceHandle>,
    /// Published by the worker once constructed, withdrawn at teardown
    pub(crate) pipeline: Option<Arc<dyn PipelineController>>,
    pub(crate) loop_running: bool,
    pub(crate) initialized: bool,
    /// Set by `stop`; later surfaces are refused
    pub(crate) closed: bool,
}

impl Bridge {
    /// True exactly once: the first time the loop runs with a surface present
    pub(crate) fn check_ready(&mut self) -> bool {
        if self.initialized || !self.loop_running || self.surface.is_none() {
            return false;
        }
        self.initialized = true;
        true
    }
}

/// State shared between the handle and the worker
pub(crate) struct Shared {
    pub(crate) id: SessionId,
    pub(crate) recorded: RecordedState,
    pub(crate) bridge: Mutex<Bridge>,
    /// Cleared by the worker thread as it exits
    pub(crate) running: AtomicBool,
}

impl Shared {
    /// Lock the bridge, recovering it if a host callback panicked under it
    pub(crate) fn lock_bridge(&self) -> MutexGuard<'_, Bridge> {
        self.bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SessionInner {
    shared: Arc<Shared>,
    commands: Sender<Command>,
    surfaces: Arc<dyn SurfaceProvider>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    stopped: Mutex<bool>,
    stopped_cond: Condvar,
}

/// Marks the session stopped and wakes concurrent `stop` callers
struct StopSignal<'a>(&'a SessionInner);

impl Drop for StopSignal<'_> {
    fn drop(&mut self) {
        *self.0.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.0.stopped_cond.notify_all();
    }
}

impl SessionInner {
    fn shutdown(&self) {
        let session = self.shared.id;

        if thread::current().id() == self.worker_id {
            // joining ourselves would never return
            warn!(session = %session, "Stop requested from the worker thread, not waiting");
            let _ = self.commands.send(Command::Quit);
            return;
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            // another caller owns the join
            self.wait_stopped();
            debug!(session = %session, "Session already stopped");
            return;
        };
        let _signal = StopSignal(self);

        debug!(session = %session, "Quitting event loop");
        if self.commands.send(Command::Quit).is_err() {
            debug!(session = %session, "Event loop already exited");
        }

        debug!(session = %session, "Waiting for worker thread to finish");
        if let Err(e) = handle.join() {
            warn!(session = %session, "Worker thread panicked: {:?}", e);
        }

        let surface = {
            let mut bridge = self.shared.lock_bridge();
            bridge.closed = true;
            bridge.surface.take()
        };
        drop(surface);
        info!(session = %session, "Session stopped");
    }

    fn wait_stopped(&self) {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            stopped = self
                .stopped_cond
                .wait(stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Thread-safe handle to a running session
///
/// Clones refer to the same session; dropping the last clone stops it.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    /// Start a session on the backend named in `config`
    pub fn start(
        config: Config,
        sink: Arc<dyn NotificationSink>,
        surfaces: Arc<dyn SurfaceProvider>,
    ) -> Result<Self, InitError> {
        let backend = backends::lookup(&config.backend)?;
        Self::start_with_backend(config, backend, sink, surfaces)
    }

    /// Start a session on an explicit backend instance
    ///
    /// Returns once the worker thread is running; the pipeline is
    /// constructed on that thread afterwards.
    pub fn start_with_backend(
        config: Config,
        backend: Arc<dyn PipelineBackend>,
        sink: Arc<dyn NotificationSink>,
        surfaces: Arc<dyn SurfaceProvider>,
    ) -> Result<Self, InitError> {
        config
            .validate()
            .map_err(|e| InitError::InvalidConfig(e.to_string()))?;
        backend.probe(&config)?;

        let id = SessionId::new();
        let shared = Arc::new(Shared {
            id,
            recorded: RecordedState::default(),
            bridge: Mutex::new(Bridge::default()),
            running: AtomicBool::new(true),
        });
        let (commands, command_rx) = crossbeam_channel::unbounded();

        let ctx = WorkerContext {
            shared: Arc::clone(&shared),
            backend,
            config,
            dispatcher: Dispatcher::new(sink, id),
            commands: command_rx,
        };

        let handle = thread::Builder::new()
            .name(format!("{}-{}", threads::WORKER_THREAD_PREFIX, id.short()))
            .spawn(move || event_loop::run(ctx))
            .map_err(|e| InitError::ThreadSpawn(e.to_string()))?;

        info!(session = %id, "Session started");
        Ok(Self {
            inner: Arc::new(SessionInner {
                shared,
                commands,
                surfaces,
                worker_id: handle.thread().id(),
                worker: Mutex::new(Some(handle)),
                stopped: Mutex::new(false),
                stopped_cond: Condvar::new(),
            }),
        })
    }

    pub fn id(&self) -> SessionId {
        self.inner.shared.id
    }

    /// Last state confirmed by the pipeline
    pub fn state(&self) -> PipelineState {
        self.inner.shared.recorded.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.shared.lock_bridge().initialized
    }

    /// Whether the worker thread is still alive
    pub fn is_running(&self) -> bool {
        self.inner.shared.running.load(Ordering::Acquire)
    }

    pub fn request_play(&self) {
        self.request_state(PipelineState::Playing);
    }

    pub fn request_pause(&self) {
        self.request_state(PipelineState::Paused);
    }

    /// Pause when playing, play otherwise
    pub fn toggle_play(&self) {
        if self.state() == PipelineState::Playing {
            self.request_pause();
        } else {
            self.request_play();
        }
    }

    /// Change output geometry: READY, apply, back to PAUSED
    ///
    /// Runs as one step on the worker, so it never interleaves with other
    /// state requests.
    pub fn reconfigure(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            warn!(width, height, "Ignoring invalid geometry");
            return;
        }
        self.send_if_constructed(Command::Reconfigure { width, height });
    }

    /// Reconfigure and resume playback
    pub fn change_resolution(&self, width: u32, height: u32) {
        debug!(width, height, "Trying to change resolution");
        self.request_pause();
        self.reconfigure(width, height);
        self.request_play();
    }

    /// Hand a new display surface to the session
    ///
    /// The new surface is bound before the previous one is released. If the
    /// token cannot be turned into a surface, the current one stays bound.
    pub fn inject_surface(&self, token: SurfaceToken) {
        let session = self.inner.shared.id;
        debug!(session = %session, token = token.0, "Received surface");

        let (ready, previous) = {
            let mut bridge = self.inner.shared.lock_bridge();
            if bridge.closed {
                debug!(session = %session, "Session stopped, ignoring surface");
                return;
            }
            let surface = match SurfaceHandle::acquire(Arc::clone(&self.inner.surfaces), token) {
                Ok(surface) => surface,
                Err(e) => {
                    warn!(session = %session, error = %e, "Keeping previous surface");
                    return;
                }
            };

            match &bridge.pipeline {
                Some(pipeline) => {
                    debug!(surface = %surface.raw(), "Pipeline already created, binding surface");
                    if let Err(e) = pipeline.bind_surface(Some(surface.raw())) {
                        warn!(error = %e, "Failed to bind surface, detaching renderer");
                        let _ = pipeline.bind_surface(None);
                    }
                }
                None => debug!("Pipeline not created yet, binding deferred"),
            }

            let previous = bridge.surface.replace(surface);
            (bridge.check_ready(), previous)
        };

        // the new surface is bound, the old one can go
        if let Some(previous) = previous {
            debug!(
                surface = %previous.raw(),
                token = previous.token().0,
                "Releasing previous surface"
            );
            drop(previous);
        }

        if ready {
            self.send(Command::NotifyInitialized);
        }
    }

    /// Detach the renderer and release the current surface
    pub fn retract_surface(&self) {
        let surface = {
            let mut bridge = self.inner.shared.lock_bridge();
            let Some(surface) = bridge.surface.take() else {
                warn!(session = %self.inner.shared.id, "Surface retracted but none is held, ignoring");
                return;
            };

            if let Some(pipeline) = &bridge.pipeline
                && let Err(e) = pipeline.bind_surface(None)
            {
                warn!(error = %e, "Failed to unbind surface");
            }
            surface
        };
        drop(surface);
    }

    pub fn set_white_balance(&self, mode: WhiteBalanceMode) {
        self.with_pipeline("white balance", |p| p.set_white_balance(mode));
    }

    /// Host integer encoding; out-of-range values are ignored
    pub fn set_white_balance_index(&self, index: i32) {
        match WhiteBalanceMode::from_index(index) {
            Some(mode) => self.set_white_balance(mode),
            None => warn!(index, "Unknown white balance mode"),
        }
    }

    pub fn set_auto_focus(&self, enabled: bool) {
        self.with_pipeline("autofocus", |p| p.set_auto_focus(enabled));
    }

    pub fn set_rotation(&self, method: RotateMethod) {
        self.with_pipeline("rotation", |p| p.set_rotation(method));
    }

    /// Host integer encoding; out-of-range values are ignored
    pub fn set_rotation_index(&self, index: i32) {
        match RotateMethod::from_index(index) {
            Some(method) => self.set_rotation(method),
            None => warn!(index, "Unknown rotate method"),
        }
    }

    /// Quit the event loop and wait for the worker thread to exit
    ///
    /// Idempotent; safe after the worker has already exited on its own.
    pub fn stop(&self) {
        self.inner.shutdown();
    }

    fn request_state(&self, target: PipelineState) {
        debug!(session = %self.inner.shared.id, state = %target, "Setting state");
        self.send_if_constructed(Command::SetState(target));
    }

    fn send_if_constructed(&self, command: Command) {
        if self.inner.shared.lock_bridge().pipeline.is_none() {
            debug!(session = %self.inner.shared.id, command = ?command, "No pipeline, ignoring");
            return;
        }
        self.send(command);
    }

    fn send(&self, command: Command) {
        if self.inner.commands.send(command).is_err() {
            debug!(session = %self.inner.shared.id, "Event loop gone, dropping command");
        }
    }

    /// Run a setter against the pipeline outside the bridge lock
    fn with_pipeline<F>(&self, what: &str, f: F)
    where
        F: FnOnce(&dyn PipelineController) -> Result<(), PipelineError>,
    {
        let pipeline = self.inner.shared.lock_bridge().pipeline.clone();
        let Some(pipeline) = pipeline else {
            debug!(session = %self.inner.shared.id, what, "No pipeline, ignoring setter");
            return;
        };
        if let Err(e) = f(pipeline.as_ref()) {
            warn!(session = %self.inner.shared.id, what, error = %e, "Setter failed");
        }
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_needs_loop_and_surface() {
        let mut bridge = Bridge::default();
        assert!(!bridge.check_ready());
        bridge.loop_running = true;
        assert!(!bridge.check_ready());
    }

    #[test]
    fn test_session_id_short_form() {
        let id = SessionId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_string().starts_with(&id.short()));
    }
}

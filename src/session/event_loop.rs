// SPDX-License-Identifier: GPL-3.0-only

//! Session worker thread
//!
//! The worker constructs the pipeline, publishes it to the host side, pumps
//! pipeline events and host commands until a quit request arrives, then tears
//! the pipeline down. Pipeline events always drain before the next host
//! command is taken, so a command never overtakes the confirmation of a
//! transition the loop itself forced.

use super::Shared;
use super::dispatch::{Dispatcher, Notification};
use super::state::{EventOrigin, PipelineEvent, PipelineState};
use crate::backends::{PipelineBackend, PipelineController};
use crate::config::Config;
use crate::constants::timing;
use crate::errors::PipelineError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Host-to-worker requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    SetState(PipelineState),
    Reconfigure { width: u32, height: u32 },
    NotifyInitialized,
    Quit,
}

/// Everything the worker thread needs, moved into it at spawn
pub(crate) struct WorkerContext {
    pub(crate) shared: Arc<Shared>,
    pub(crate) backend: Arc<dyn PipelineBackend>,
    pub(crate) config: Config,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) commands: Receiver<Command>,
}

/// Worker thread entry point
pub(crate) fn run(ctx: WorkerContext) {
    let WorkerContext {
        shared,
        backend,
        config,
        dispatcher,
        commands,
    } = ctx;
    let session = shared.id;
    let _running = RunningGuard(Arc::clone(&shared));

    debug!(session = %session, backend = backend.name(), "Creating pipeline");
    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let controller = match backend.build(&config, event_tx.clone()) {
        Ok(controller) => controller,
        Err(e) => {
            error!(session = %session, error = %e, "Pipeline construction failed");
            dispatcher.notify(Notification::Error(e.to_string()));
            return;
        }
    };

    if let Some(geometry) = config.initial_geometry
        && let Err(e) = controller.set_output_geometry(geometry.width, geometry.height)
    {
        warn!(session = %session, error = %e, "Failed to apply initial geometry");
    }

    let mut event_loop = EventLoop {
        shared,
        dispatcher,
        controller,
        events: event_rx,
        _events_keepalive: event_tx,
        commands,
        error_stop_timeout: config.error_stop_timeout(),
    };

    event_loop.publish();
    debug!(session = %session, "Entering event loop");
    event_loop.run();
    debug!(session = %session, "Exited event loop");
    event_loop.teardown();
}

/// Clears the running flag however the worker exits
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

struct EventLoop {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    controller: Arc<dyn PipelineController>,
    events: Receiver<PipelineEvent>,
    /// Keeps the event channel connected if the controller drops its sender
    _events_keepalive: Sender<PipelineEvent>,
    commands: Receiver<Command>,
    error_stop_timeout: Duration,
}

impl EventLoop {
    /// Make the pipeline visible to host-thread operations
    ///
    /// A surface injected before construction is bound here, before any
    /// state request can reach the pipeline.
    fn publish(&self) {
        let ready = {
            let mut bridge = self.shared.lock_bridge();
            if let Some(surface) = &bridge.surface {
                debug!(surface = %surface.raw(), "Surface already received, binding it");
                if let Err(e) = self.controller.bind_surface(Some(surface.raw())) {
                    warn!(error = %e, "Failed to bind surface");
                }
            }
            bridge.pipeline = Some(Arc::clone(&self.controller));
            bridge.loop_running = true;
            bridge.check_ready()
        };

        if ready {
            self.notify_initialized();
        }
    }

    fn run(&mut self) {
        loop {
            self.drain_events();

            select! {
                recv(self.events) -> event => {
                    if let Ok(event) = event {
                        self.handle_event(event);
                    }
                }
                recv(self.commands) -> command => match command {
                    Ok(Command::Quit) => {
                        debug!("Quit requested");
                        break;
                    }
                    Ok(command) => {
                        // events posted before the command was sent go first
                        self.drain_events();
                        self.handle_command(command);
                    }
                    Err(_) => {
                        debug!("Session handle gone, quitting");
                        break;
                    }
                },
            }
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StateChanged {
                origin, old, new, ..
            } => self.on_state_changed(origin, old, new),
            PipelineEvent::Error { source, message } => {
                self.on_error(PipelineError::new(source, message));
            }
            PipelineEvent::EndOfStream => {
                info!("End of stream, pausing");
                self.request_state(PipelineState::Paused);
            }
        }
    }

    /// Only transitions of the top-level pipeline are recorded and reported
    fn on_state_changed(&self, origin: EventOrigin, old: PipelineState, new: PipelineState) {
        if let EventOrigin::Stage(stage) = origin {
            trace!(stage = %stage, old = %old, new = %new, "Ignoring stage state change");
            return;
        }

        self.shared.recorded.set(new);
        debug!(old = %old, new = %new, "State changed, notifying application");
        self.dispatcher.notify(Notification::StateChanged(new));
    }

    /// Hard-stop the pipeline, wait for NULL to be confirmed, then tell the host
    fn on_error(&mut self, err: PipelineError) {
        error!(error = %err, "Pipeline error, forcing NULL");
        if let Err(e) = self.controller.set_target_state(PipelineState::Null) {
            warn!(error = %e, "Failed to force NULL");
        }

        let mut messages = vec![err.to_string()];
        let deadline = Instant::now() + self.error_stop_timeout;
        // queued events predating the forced stop are replayed first
        while self.shared.recorded.get() != PipelineState::Null || !self.events.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(PipelineEvent::StateChanged {
                    origin, old, new, ..
                }) => self.on_state_changed(origin, old, new),
                Ok(PipelineEvent::Error { source, message }) => {
                    messages.push(PipelineError::new(source, message).to_string());
                }
                Ok(PipelineEvent::EndOfStream) => trace!("Ignoring end of stream while stopping"),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        timeout_ms = self.error_stop_timeout.as_millis() as u64,
                        "NULL not confirmed after error"
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for message in messages {
            self.dispatcher.notify(Notification::Error(message));
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetState(target) => self.request_state(target),
            Command::Reconfigure { width, height } => self.reconfigure(width, height),
            Command::NotifyInitialized => self.notify_initialized(),
            Command::Quit => {}
        }
    }

    fn request_state(&mut self, target: PipelineState) {
        debug!(state = %target, "Requesting state");
        if let Err(e) = self.controller.set_target_state(target) {
            self.on_error(e);
        }
    }

    /// Quiescent pass through READY, new geometry, back to PAUSED
    fn reconfigure(&mut self, width: u32, height: u32) {
        info!(width, height, "Reconfiguring output geometry");
        if let Err(e) = self.controller.set_target_state(PipelineState::Ready) {
            self.on_error(e);
            return;
        }
        if let Err(e) = self.controller.set_output_geometry(width, height) {
            warn!(error = %e, "Failed to apply output geometry");
        }
        self.request_state(PipelineState::Paused);
    }

    fn notify_initialized(&self) {
        debug!("Initialization complete, notifying application");
        self.dispatcher.notify(Notification::Initialized);
    }

    /// Release everything in reverse order of acquisition
    ///
    /// No notifications are delivered from here on.
    fn teardown(self) {
        {
            let mut bridge = self.shared.lock_bridge();
            bridge.loop_running = false;
            bridge.pipeline = None;
        }

        if let Err(e) = self.controller.set_target_state(PipelineState::Null) {
            warn!(error = %e, "Failed to stop pipeline");
        }
        self.settle_null();
        self.shared.recorded.set(PipelineState::Null);

        if let Err(e) = self.controller.bind_surface(None) {
            debug!(error = %e, "Failed to unbind surface during teardown");
        }

        let EventLoop { controller, .. } = self;
        if Arc::strong_count(&controller) > 1 {
            debug!("Pipeline still referenced by an in-flight host call");
        }
        drop(controller);
        info!("Pipeline released");
    }

    /// Consume pending events until the graph reports NULL, without notifying
    fn settle_null(&self) {
        let mut current = self.shared.recorded.get();
        let deadline = Instant::now() + timing::TEARDOWN_TIMEOUT;
        while current != PipelineState::Null {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(PipelineEvent::StateChanged {
                    origin: EventOrigin::Pipeline,
                    new,
                    ..
                }) => current = new,
                Ok(event) => trace!(event = ?event, "Discarding event during teardown"),
                Err(_) => {
                    warn!(state = %current, "NULL not confirmed during teardown");
                    break;
                }
            }
        }
    }
}

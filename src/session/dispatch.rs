// SPDX-License-Identifier: GPL-3.0-only

//! Notification delivery from the worker thread to the host
//!
//! Each worker thread attaches itself to the host's calling context the first
//! time it delivers a notification. The attachment is cached in thread-local
//! storage and detached by its destructor when the thread exits, not after
//! every call.

use super::SessionId;
use super::state::PipelineState;
use crate::errors::CallbackError;
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Host-implemented callback interface
///
/// Failures returned (or panics raised) by these methods are logged and
/// discarded; they never reach the event loop.
pub trait NotificationSink: Send + Sync {
    /// Associate the calling worker thread with the host context
    fn attach_thread(&self) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Undo `attach_thread`; runs on the worker thread as it exits
    fn detach_thread(&self) {}

    fn on_error(&self, message: &str) -> Result<(), CallbackError>;

    fn on_state_changed(&self, state: PipelineState) -> Result<(), CallbackError>;

    /// Delivered exactly once per session
    fn on_initialized(&self) -> Result<(), CallbackError>;
}

/// A single host notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Error(String),
    StateChanged(PipelineState),
    Initialized,
}

/// Sink that forwards notifications into a channel
///
/// Useful when the host wants to handle notifications on its own thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: crossbeam_channel::Sender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, crossbeam_channel::Receiver<Notification>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    fn forward(&self, notification: Notification) -> Result<(), CallbackError> {
        self.sender
            .send(notification)
            .map_err(|_| CallbackError::Failed("notification receiver dropped".into()))
    }
}

impl NotificationSink for ChannelSink {
    fn on_error(&self, message: &str) -> Result<(), CallbackError> {
        self.forward(Notification::Error(message.to_string()))
    }

    fn on_state_changed(&self, state: PipelineState) -> Result<(), CallbackError> {
        self.forward(Notification::StateChanged(state))
    }

    fn on_initialized(&self) -> Result<(), CallbackError> {
        self.forward(Notification::Initialized)
    }
}

struct HostAttachment {
    sink: Arc<dyn NotificationSink>,
}

impl Drop for HostAttachment {
    fn drop(&mut self) {
        debug!(thread = ?std::thread::current().name(), "Detaching thread");
        if panic::catch_unwind(AssertUnwindSafe(|| self.sink.detach_thread())).is_err() {
            error!("Host detach panicked");
        }
    }
}

thread_local! {
    static ATTACHMENT: RefCell<Option<HostAttachment>> = const { RefCell::new(None) };
}

/// Delivers notifications to one session's sink
pub(crate) struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    session: SessionId,
}

impl Dispatcher {
    pub(crate) fn new(sink: Arc<dyn NotificationSink>, session: SessionId) -> Self {
        Self { sink, session }
    }

    pub(crate) fn notify(&self, notification: Notification) {
        if let Err(e) = self.ensure_attached() {
            error!(session = %self.session, error = %e, "Dropping notification");
            return;
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| match &notification {
            Notification::Error(message) => self.sink.on_error(message),
            Notification::StateChanged(state) => self.sink.on_state_changed(*state),
            Notification::Initialized => self.sink.on_initialized(),
        }));

        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(payload) => CallbackError::Panicked(panic_message(payload.as_ref())),
        };
        error!(
            session = %self.session,
            notification = ?notification,
            error = %failure,
            "Failed to call host"
        );
    }

    fn ensure_attached(&self) -> Result<(), CallbackError> {
        let attached = ATTACHMENT.with(|slot| {
            slot.borrow()
                .as_ref()
                .is_some_and(|a| Arc::ptr_eq(&a.sink, &self.sink))
        });
        if attached {
            return Ok(());
        }

        debug!(session = %self.session, thread = ?std::thread::current().name(), "Attaching thread");
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.attach_thread())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(payload) => {
                return Err(CallbackError::AttachFailed(panic_message(payload.as_ref())));
            }
        }

        let previous = ATTACHMENT.with(|slot| {
            slot.borrow_mut().replace(HostAttachment {
                sink: Arc::clone(&self.sink),
            })
        });
        // detach a stale attachment outside the borrow
        drop(previous);
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct CountingSink {
        attached: AtomicUsize,
        detached: AtomicUsize,
        delivered: Mutex<Vec<Notification>>,
        fail: bool,
    }

    impl NotificationSink for CountingSink {
        fn attach_thread(&self) -> Result<(), CallbackError> {
            self.attached.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn detach_thread(&self) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, message: &str) -> Result<(), CallbackError> {
            if self.fail {
                panic!("host exploded");
            }
            self.delivered
                .lock()
                .unwrap()
                .push(Notification::Error(message.to_string()));
            Ok(())
        }

        fn on_state_changed(&self, state: PipelineState) -> Result<(), CallbackError> {
            if self.fail {
                return Err(CallbackError::Failed("rejected".into()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push(Notification::StateChanged(state));
            Ok(())
        }

        fn on_initialized(&self) -> Result<(), CallbackError> {
            self.delivered.lock().unwrap().push(Notification::Initialized);
            Ok(())
        }
    }

    #[test]
    fn test_attachment_is_cached_per_thread_and_detached_on_exit() {
        let sink = Arc::new(CountingSink::default());
        let dispatcher = Dispatcher::new(sink.clone(), SessionId::new());

        thread::spawn(move || {
            dispatcher.notify(Notification::Initialized);
            dispatcher.notify(Notification::StateChanged(PipelineState::Ready));
            dispatcher.notify(Notification::StateChanged(PipelineState::Paused));
        })
        .join()
        .unwrap();

        assert_eq!(sink.attached.load(Ordering::SeqCst), 1);
        assert_eq!(sink.detached.load(Ordering::SeqCst), 1);
        assert_eq!(sink.delivered.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_callback_failures_are_absorbed() {
        let sink = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(sink.clone(), SessionId::new());

        thread::spawn(move || {
            dispatcher.notify(Notification::Error("boom".into()));
            dispatcher.notify(Notification::StateChanged(PipelineState::Null));
            // still usable after a panic and an error
            dispatcher.notify(Notification::Initialized);
        })
        .join()
        .unwrap();

        assert_eq!(
            sink.delivered.lock().unwrap().as_slice(),
            &[Notification::Initialized]
        );
    }

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, receiver) = ChannelSink::new();
        sink.on_state_changed(PipelineState::Paused).unwrap();
        sink.on_error("late").unwrap();

        assert_eq!(
            receiver.try_iter().collect::<Vec<_>>(),
            vec![
                Notification::StateChanged(PipelineState::Paused),
                Notification::Error("late".into()),
            ]
        );

        drop(receiver);
        assert!(sink.on_initialized().is_err());
    }
}

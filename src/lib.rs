// SPDX-License-Identifier: GPL-3.0-only

//! Camera Session - lifecycle bridge between a host application and a
//! capture pipeline running on its own worker thread
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`session`]: Host-facing handle, worker event loop and notification dispatch
//! - [`backends`]: Pipeline backend abstraction and registry
//! - [`config`]: Session configuration handling
//! - [`constants`]: Pipeline names, timeouts and parameter enums
//! - [`errors`]: Error taxonomy
//!
//! # Example
//!
//! ```no_run
//! use camera_session::session::dispatch::{ChannelSink, Notification};
//! use camera_session::session::surface::{PassthroughSurfaces, SurfaceToken};
//! use camera_session::{Config, SessionHandle};
//! use std::sync::Arc;
//!
//! let (sink, notifications) = ChannelSink::new();
//! let session = SessionHandle::start(
//!     Config::default(),
//!     Arc::new(sink),
//!     Arc::new(PassthroughSurfaces),
//! )?;
//! session.inject_surface(SurfaceToken(0x1000));
//!
//! for notification in notifications.iter() {
//!     if notification == Notification::Initialized {
//!         session.request_play();
//!         break;
//!     }
//! }
//! session.stop();
//! # Ok::<(), camera_session::errors::InitError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod session;

// Re-export commonly used types
pub use config::{Config, Geometry};
pub use constants::{RotateMethod, WhiteBalanceMode};
pub use errors::{CallbackError, InitError, PipelineError, ResourceError, SessionError};
pub use session::SessionHandle;
pub use session::dispatch::{Notification, NotificationSink};
pub use session::state::PipelineState;
pub use session::surface::{SurfaceProvider, SurfaceToken};

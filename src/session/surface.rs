// SPDX-License-Identifier: GPL-3.0-only

//! Display surface handles
//!
//! A [`SurfaceHandle`] owns one acquisition of a platform surface and gives
//! it back to its [`SurfaceProvider`] exactly once, when dropped.

use crate::errors::ResourceError;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Opaque token delivered by the host's window system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceToken(pub u64);

/// Native window handle understood by the rendering stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSurface(NonZeroUsize);

impl RawSurface {
    /// `None` for the null handle
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn as_raw(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for RawSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The platform's surface system, as seen by a session
pub trait SurfaceProvider: Send + Sync {
    /// Turn a host token into a native handle, taking a reference on it
    fn acquire(&self, token: SurfaceToken) -> Result<RawSurface, ResourceError>;

    /// Drop the reference taken by `acquire`
    fn release(&self, surface: RawSurface);
}

/// Provider for hosts whose tokens already are native window handles
///
/// Acquire and release are no-ops apart from rejecting the null handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSurfaces;

impl SurfaceProvider for PassthroughSurfaces {
    fn acquire(&self, token: SurfaceToken) -> Result<RawSurface, ResourceError> {
        usize::try_from(token.0)
            .ok()
            .and_then(RawSurface::new)
            .ok_or_else(|| ResourceError::InvalidToken(format!("{:#x}", token.0)))
    }

    fn release(&self, _surface: RawSurface) {}
}

/// One live reference to a platform surface
pub struct SurfaceHandle {
    raw: RawSurface,
    token: SurfaceToken,
    provider: Arc<dyn SurfaceProvider>,
}

impl SurfaceHandle {
    pub fn acquire(
        provider: Arc<dyn SurfaceProvider>,
        token: SurfaceToken,
    ) -> Result<Self, ResourceError> {
        let raw = provider.acquire(token)?;
        debug!(token = token.0, surface = %raw, "Got native surface");
        Ok(Self {
            raw,
            token,
            provider,
        })
    }

    pub fn raw(&self) -> RawSurface {
        self.raw
    }

    pub fn token(&self) -> SurfaceToken {
        self.token
    }
}

impl fmt::Debug for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("raw", &self.raw)
            .field("token", &self.token)
            .finish()
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        debug!(surface = %self.raw, "Releasing native surface");
        let release = panic::catch_unwind(AssertUnwindSafe(|| self.provider.release(self.raw)));
        if release.is_err() {
            error!(surface = %self.raw, "Surface provider panicked while releasing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingProvider {
        released: Mutex<Vec<RawSurface>>,
    }

    impl SurfaceProvider for CountingProvider {
        fn acquire(&self, token: SurfaceToken) -> Result<RawSurface, ResourceError> {
            RawSurface::new(token.0 as usize)
                .ok_or_else(|| ResourceError::InvalidToken("null".into()))
        }

        fn release(&self, surface: RawSurface) {
            self.released.lock().unwrap().push(surface);
        }
    }

    #[test]
    fn test_handle_releases_exactly_once_on_drop() {
        let provider = Arc::new(CountingProvider::default());
        let handle = SurfaceHandle::acquire(provider.clone(), SurfaceToken(0x40)).unwrap();
        assert_eq!(handle.raw().as_raw(), 0x40);
        drop(handle);

        let released = provider.released.lock().unwrap();
        assert_eq!(released.as_slice(), &[RawSurface::new(0x40).unwrap()]);
    }

    #[test]
    fn test_failed_acquire_releases_nothing() {
        let provider = Arc::new(CountingProvider::default());
        assert!(SurfaceHandle::acquire(provider.clone(), SurfaceToken(0)).is_err());
        assert!(provider.released.lock().unwrap().is_empty());
    }

    struct PanickingProvider;

    impl SurfaceProvider for PanickingProvider {
        fn acquire(&self, token: SurfaceToken) -> Result<RawSurface, ResourceError> {
            PassthroughSurfaces.acquire(token)
        }

        fn release(&self, _surface: RawSurface) {
            panic!("window system gone");
        }
    }

    #[test]
    fn test_release_panic_is_contained() {
        let handle = SurfaceHandle::acquire(Arc::new(PanickingProvider), SurfaceToken(0x40)).unwrap();
        assert_eq!(handle.token(), SurfaceToken(0x40));
        drop(handle);
    }

    #[test]
    fn test_passthrough_rejects_null_token() {
        assert!(PassthroughSurfaces.acquire(SurfaceToken(0)).is_err());
        assert_eq!(
            PassthroughSurfaces.acquire(SurfaceToken(7)).map(|s| s.as_raw()),
            Ok(7)
        );
    }
}

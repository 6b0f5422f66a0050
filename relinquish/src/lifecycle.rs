//! Scope guards.
//!
//! A guard owns a resource and releases it when the scope ends. Calling
//! [`ReleaseGuard::release`] takes the explicit path and surfaces failures;
//! letting the guard drop takes the implicit path, where failures are logged
//! and absorbed.

use std::ops::Deref;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::errors::ReleaseResult;
use crate::release::{release_async_implicitly, release_implicitly, AsyncRelease, Release};

/// Releases a synchronous resource when dropped.
///
/// ```rust
/// use relinquish::{Releasable, Releaser, ReleaseExt};
///
/// let guard = Releaser::from_fn(|| println!("closed")).guarded();
/// assert!(guard.is_alive());
/// drop(guard); // prints "closed"
/// ```
#[derive(Debug)]
pub struct ReleaseGuard<R: Release> {
    resource: Option<R>,
}

impl<R: Release> ReleaseGuard<R> {
    /// Takes ownership of `resource`.
    pub const fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// Releases now, propagating any failure.
    pub fn release(mut self) -> ReleaseResult<bool> {
        match self.resource.take() {
            Some(resource) => resource.release(),
            None => Ok(false),
        }
    }

    /// Disarms the guard and hands the resource back unreleased.
    pub fn into_inner(mut self) -> R {
        // Only release() and into_inner() empty the slot, and both consume self.
        self.resource
            .take()
            .expect("ReleaseGuard holds its resource until consumed")
    }
}

impl<R: Release> Deref for ReleaseGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource
            .as_ref()
            .expect("ReleaseGuard holds its resource until consumed")
    }
}

impl<R: Release> Drop for ReleaseGuard<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            trace!("release guard dropped; releasing implicitly");
            release_implicitly(&resource);
        }
    }
}

/// Releases an asynchronous resource in the background when dropped.
///
/// `Drop` cannot await, so the release is spawned onto the current tokio
/// runtime. Without a runtime the resource is dropped unreleased and the
/// event is logged.
#[derive(Debug)]
pub struct AsyncReleaseGuard<R: AsyncRelease + 'static> {
    resource: Option<Arc<R>>,
}

impl<R: AsyncRelease + 'static> AsyncReleaseGuard<R> {
    /// Takes shared ownership of `resource`.
    pub const fn new(resource: Arc<R>) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    /// Releases now, propagating any failure.
    pub async fn release(mut self) -> ReleaseResult<bool> {
        match self.resource.take() {
            Some(resource) => resource.release_async().await,
            None => Ok(false),
        }
    }

    /// Disarms the guard and hands the resource back unreleased.
    pub fn into_inner(mut self) -> Arc<R> {
        self.resource
            .take()
            .expect("AsyncReleaseGuard holds its resource until consumed")
    }
}

impl<R: AsyncRelease + 'static> Deref for AsyncReleaseGuard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.resource
            .as_deref()
            .expect("AsyncReleaseGuard holds its resource until consumed")
    }
}

impl<R: AsyncRelease + 'static> Drop for AsyncReleaseGuard<R> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                drop(handle.spawn(async move {
                    release_async_implicitly(resource.as_ref()).await;
                }));
            }
            Err(_) => debug!("async release guard dropped outside a runtime; not released"),
        }
    }
}

/// Wraps resources in scope guards.
pub trait ReleaseExt: Release + Sized {
    /// Releases `self` when the returned guard is dropped.
    fn guarded(self) -> ReleaseGuard<Self> {
        ReleaseGuard::new(self)
    }
}

impl<R: Release> ReleaseExt for R {}

//! Release capabilities.
//!
//! [`Release`] and [`AsyncRelease`] are the two ways a resource can be torn
//! down. Both extend [`Releasable`], which exposes the resource's
//! [`ReleaseState`] when it has one so collections can subscribe to it.
//!
//! The explicit entry points propagate failures. The `*_implicitly` helpers
//! are for teardown with no caller to report to: they log failures at `debug`
//! level and absorb them, panics included.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::debug;

use crate::errors::{panic_message, ReleaseError, ReleaseResult};
use crate::state::ReleaseState;
use crate::types::ReleaseMode;

/// Something with a release lifecycle.
pub trait Releasable: Send + Sync {
    /// The state machine behind this resource, if it exposes one.
    ///
    /// Collections subscribe to it so a member released on its own is
    /// forgotten automatically. Resources returning `None` stay in a
    /// collection until it is released or they are removed.
    fn release_state(&self) -> Option<&ReleaseState> {
        None
    }

    /// True until release has been requested.
    fn is_alive(&self) -> bool {
        self.release_state().map_or(true, ReleaseState::is_alive)
    }

    /// True once the resource is releasing or released.
    fn was_released(&self) -> bool {
        self.release_state().is_some_and(ReleaseState::was_released)
    }

    /// Fails with [`ReleaseError::AlreadyReleased`] once the resource is no
    /// longer usable.
    fn assert_alive(&self) -> ReleaseResult<()> {
        self.release_state().map_or(Ok(()), ReleaseState::assert_alive)
    }
}

/// A resource released synchronously.
pub trait Release: Releasable {
    /// Releases the resource.
    ///
    /// Returns `Ok(true)` if this call performed the release and `Ok(false)`
    /// if it had already happened. Implementations must be idempotent and
    /// safe to call from several threads at once.
    fn release(&self) -> ReleaseResult<bool>;
}

/// A resource released asynchronously.
#[async_trait]
pub trait AsyncRelease: Releasable {
    /// Releases the resource.
    ///
    /// Same contract as [`Release::release`]. Callers that lose the race wait
    /// for the winner to finish before returning `Ok(false)`.
    async fn release_async(&self) -> ReleaseResult<bool>;
}

impl<T: Releasable + ?Sized> Releasable for Arc<T> {
    fn release_state(&self) -> Option<&ReleaseState> {
        (**self).release_state()
    }
}

impl<T: Release + ?Sized> Release for Arc<T> {
    fn release(&self) -> ReleaseResult<bool> {
        (**self).release()
    }
}

#[async_trait]
impl<T: AsyncRelease + ?Sized> AsyncRelease for Arc<T> {
    async fn release_async(&self) -> ReleaseResult<bool> {
        (**self).release_async().await
    }
}

/// Releases `resource`, propagating failures only when `mode` is explicit.
pub fn release_with_mode<R>(resource: &R, mode: ReleaseMode) -> ReleaseResult<bool>
where
    R: Release + ?Sized,
{
    match mode {
        ReleaseMode::Explicit => resource.release(),
        ReleaseMode::Implicit => Ok(release_implicitly(resource)),
    }
}

/// Releases `resource` on an implicit path.
///
/// Errors and panics are logged at `debug` level and absorbed. Returns true
/// if the release was attempted by this call.
pub fn release_implicitly<R>(resource: &R) -> bool
where
    R: Release + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| resource.release())) {
        Ok(Ok(performed)) => performed,
        Ok(Err(error)) => {
            debug!(%error, "implicit release failed");
            true
        }
        Err(payload) => {
            debug!(panic = %panic_message(payload.as_ref()), "implicit release panicked");
            true
        }
    }
}

/// Async counterpart of [`release_implicitly`].
pub async fn release_async_implicitly<R>(resource: &R) -> bool
where
    R: AsyncRelease + ?Sized,
{
    match AssertUnwindSafe(resource.release_async()).catch_unwind().await {
        Ok(Ok(performed)) => performed,
        Ok(Err(error)) => {
            debug!(%error, "implicit async release failed");
            true
        }
        Err(payload) => {
            debug!(panic = %panic_message(payload.as_ref()), "implicit async release panicked");
            true
        }
    }
}

/// Releases every resource in order, continuing past failures.
///
/// Returns how many resources this call released. Failures are reported
/// together once every resource has been tried.
pub fn release_all<'a, I, R>(resources: I) -> ReleaseResult<usize>
where
    I: IntoIterator<Item = &'a R>,
    R: Release + ?Sized + 'a,
{
    let mut released = 0;
    let mut failures = Vec::new();
    for resource in resources {
        match resource.release() {
            Ok(true) => released += 1,
            Ok(false) => {}
            Err(error) => failures.push(error),
        }
    }
    ReleaseError::from_failures(failures)?;
    Ok(released)
}

/// Awaits the release of every resource in order, continuing past failures.
pub async fn release_all_async<'a, I, R>(resources: I) -> ReleaseResult<usize>
where
    I: IntoIterator<Item = &'a R>,
    R: AsyncRelease + ?Sized + 'a,
{
    let mut released = 0;
    let mut failures = Vec::new();
    for resource in resources {
        match resource.release_async().await {
            Ok(true) => released += 1,
            Ok(false) => {}
            Err(error) => failures.push(error),
        }
    }
    ReleaseError::from_failures(failures)?;
    Ok(released)
}

//! Closure-backed releasables.
//!
//! [`Releaser`] and [`AsyncReleaser`] wrap a release routine supplied at
//! construction. The routine runs at most once, on the first release call,
//! and is dropped without running if the releaser is dropped alive.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::errors::{BoxError, ReleaseResult};
use crate::release::{AsyncRelease, Release, Releasable};
use crate::state::ReleaseState;
use crate::types::ResourceName;

type Routine = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;
type AsyncRoutine = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Runs a synchronous routine when released.
///
/// ```rust
/// use relinquish::{Release, Releaser};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let closed = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&closed);
/// let releaser = Releaser::from_fn(move || flag.store(true, Ordering::SeqCst));
///
/// assert!(releaser.release()?);
/// assert!(closed.load(Ordering::SeqCst));
/// assert!(!releaser.release()?);
/// # Ok::<(), relinquish::ReleaseError>(())
/// ```
pub struct Releaser {
    state: ReleaseState,
    routine: Mutex<Option<Routine>>,
}

impl Releaser {
    /// Wraps a fallible routine.
    pub fn new<F, E>(routine: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_state(ReleaseState::with_label("Releaser"), routine)
    }

    /// Wraps a routine that cannot fail.
    pub fn from_fn<F>(routine: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(move || {
            routine();
            Ok::<(), BoxError>(())
        })
    }

    /// Wraps a fallible routine under a name used in errors and logs.
    pub fn named<F, E>(name: ResourceName, routine: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_state(ReleaseState::named(name), routine)
    }

    /// Like [`named`](Self::named), also registering with the global leak
    /// detector.
    #[track_caller]
    pub fn tracked<F, E>(name: ResourceName, routine: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_state(ReleaseState::tracked(name), routine)
    }

    fn with_state<F, E>(state: ReleaseState, routine: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        let routine: Routine = Box::new(move || routine().map_err(Into::<BoxError>::into));
        Self {
            state,
            routine: Mutex::new(Some(routine)),
        }
    }

    /// The underlying state machine.
    pub const fn state(&self) -> &ReleaseState {
        &self.state
    }
}

impl Releasable for Releaser {
    fn release_state(&self) -> Option<&ReleaseState> {
        Some(&self.state)
    }
}

impl Release for Releaser {
    fn release(&self) -> ReleaseResult<bool> {
        self.state.run_release(|| {
            let routine = self.routine.lock().take();
            routine.map_or(Ok(()), |routine| routine())
        })
    }
}

impl fmt::Debug for Releaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Releaser")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Runs an asynchronous routine when released.
///
/// ```rust
/// use relinquish::{AsyncRelease, AsyncReleaser};
///
/// # tokio_test::block_on(async {
/// let releaser = AsyncReleaser::new(|| async {
///     tokio::task::yield_now().await;
///     Ok::<(), std::io::Error>(())
/// });
/// assert!(releaser.release_async().await?);
/// assert!(!releaser.release_async().await?);
/// # Ok::<(), relinquish::ReleaseError>(())
/// # }).unwrap();
/// ```
pub struct AsyncReleaser {
    state: ReleaseState,
    routine: Mutex<Option<AsyncRoutine>>,
}

impl AsyncReleaser {
    /// Wraps a fallible async routine.
    pub fn new<F, Fut, E>(routine: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_state(ReleaseState::with_label("AsyncReleaser"), routine)
    }

    /// Wraps an async routine that cannot fail.
    pub fn from_fn<F, Fut>(routine: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(move || routine().map(Ok::<(), BoxError>))
    }

    /// Wraps a fallible async routine under a name used in errors and logs.
    pub fn named<F, Fut, E>(name: ResourceName, routine: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::with_state(ReleaseState::named(name), routine)
    }

    fn with_state<F, Fut, E>(state: ReleaseState, routine: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let routine: AsyncRoutine = Box::new(move || {
            routine()
                .map(|result| result.map_err(Into::<BoxError>::into))
                .boxed()
        });
        Self {
            state,
            routine: Mutex::new(Some(routine)),
        }
    }

    /// The underlying state machine.
    pub const fn state(&self) -> &ReleaseState {
        &self.state
    }
}

impl Releasable for AsyncReleaser {
    fn release_state(&self) -> Option<&ReleaseState> {
        Some(&self.state)
    }
}

#[async_trait]
impl AsyncRelease for AsyncReleaser {
    async fn release_async(&self) -> ReleaseResult<bool> {
        self.state
            .run_release_async(|| {
                let routine = self.routine.lock().take();
                async move {
                    match routine {
                        Some(routine) => routine().await,
                        None => Ok(()),
                    }
                }
            })
            .await
    }
}

impl fmt::Debug for AsyncReleaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReleaser")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

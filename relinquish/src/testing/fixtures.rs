//! Releasers that record how often they ran.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::BoxError;
use crate::releaser::{AsyncReleaser, Releaser};

/// Shared count of routine invocations.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a routine bound to this counter ran.
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`Releaser`] whose routine bumps the returned counter.
pub fn counting_releaser() -> (ReleaseCounter, Arc<Releaser>) {
    let counter = ReleaseCounter::new();
    let handle = counter.clone();
    let releaser = Releaser::from_fn(move || handle.increment());
    (counter, Arc::new(releaser))
}

/// An [`AsyncReleaser`] whose routine yields once and bumps the counter.
pub fn counting_async_releaser() -> (ReleaseCounter, Arc<AsyncReleaser>) {
    let counter = ReleaseCounter::new();
    let handle = counter.clone();
    let releaser = AsyncReleaser::from_fn(move || async move {
        tokio::task::yield_now().await;
        handle.increment();
    });
    (counter, Arc::new(releaser))
}

/// A [`Releaser`] that counts its run and then fails with `message`.
pub fn failing_releaser(message: &'static str) -> (ReleaseCounter, Arc<Releaser>) {
    let counter = ReleaseCounter::new();
    let handle = counter.clone();
    let releaser = Releaser::new(move || {
        handle.increment();
        Err::<(), BoxError>(message.into())
    });
    (counter, Arc::new(releaser))
}

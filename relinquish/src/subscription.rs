//! Observing a stream until it ends or is released.
//!
//! [`subscribe`] drives a stream on a spawned task and hands every item to an
//! [`Observer`]. The returned handle is an [`AsyncReleaser`]: releasing it
//! stops the pump, and the pump releases it when the stream finishes, so the
//! handle's before-release listeners fire exactly once either way.

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::{AbortHandle, Abortable};
use futures::{FutureExt, Stream, StreamExt};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::errors::{panic_message, BoxError, ReleaseError, ReleaseResult};
use crate::release::release_async_implicitly;
use crate::releaser::AsyncReleaser;

/// Receives the items of a subscribed stream.
pub trait Observer<T, E>: Send + 'static {
    /// Called for every item.
    fn on_next(&mut self, item: T);

    /// Called once if the stream yields an error. Nothing follows it.
    fn on_error(&mut self, error: E) {
        let _ = error;
    }

    /// Called once if the stream ends on its own.
    fn on_completed(&mut self) {}
}

/// An [`Observer`] assembled from closures.
pub struct FnObserver<T, E, N> {
    on_next: N,
    on_error: Option<Box<dyn FnMut(E) + Send>>,
    on_completed: Option<Box<dyn FnMut() + Send>>,
    _items: PhantomData<fn(T)>,
}

impl<T, E, N> FnObserver<T, E, N>
where
    N: FnMut(T) + Send + 'static,
{
    /// Observes items with `on_next`.
    pub fn new(on_next: N) -> Self {
        Self {
            on_next,
            on_error: None,
            on_completed: None,
            _items: PhantomData,
        }
    }

    /// Adds an error callback.
    #[must_use]
    pub fn with_error(mut self, on_error: impl FnMut(E) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(on_error));
        self
    }

    /// Adds a completion callback.
    #[must_use]
    pub fn with_completed(mut self, on_completed: impl FnMut() + Send + 'static) -> Self {
        self.on_completed = Some(Box::new(on_completed));
        self
    }
}

impl<T, E, N> Observer<T, E> for FnObserver<T, E, N>
where
    T: 'static,
    E: 'static,
    N: FnMut(T) + Send + 'static,
{
    fn on_next(&mut self, item: T) {
        (self.on_next)(item);
    }

    fn on_error(&mut self, error: E) {
        if let Some(on_error) = self.on_error.as_mut() {
            on_error(error);
        }
    }

    fn on_completed(&mut self) {
        if let Some(on_completed) = self.on_completed.as_mut() {
            on_completed();
        }
    }
}

/// Spawns a task feeding `stream` to `observer`.
///
/// Releasing the returned handle stops the pump without calling
/// [`Observer::on_completed`]. Fails with [`ReleaseError::NoRuntime`] outside
/// a tokio runtime.
///
/// ```rust
/// use relinquish::{subscribe, FnObserver};
/// use std::sync::{Arc, Mutex};
///
/// # tokio_test::block_on(async {
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let items = futures::stream::iter([Ok::<_, std::io::Error>(1), Ok(2)]);
///
/// let handle = subscribe(items, FnObserver::new(move |n: i32| sink.lock().unwrap().push(n)))?;
/// handle.state().wait_released().await;
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// # Ok::<(), relinquish::ReleaseError>(())
/// # }).unwrap();
/// ```
pub fn subscribe<S, T, E, O>(stream: S, observer: O) -> ReleaseResult<Arc<AsyncReleaser>>
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    O: Observer<T, E>,
{
    let runtime = Handle::try_current().map_err(|_| ReleaseError::NoRuntime {
        operation: "subscribe to a stream",
    })?;
    let (abort, registration) = AbortHandle::new_pair();
    let handle = Arc::new(AsyncReleaser::new(move || async move {
        abort.abort();
        Ok::<(), BoxError>(())
    }));

    let releaser = Arc::clone(&handle);
    drop(runtime.spawn(async move {
        let pumped = AssertUnwindSafe(Abortable::new(pump(stream, observer), registration))
            .catch_unwind()
            .await;
        match pumped {
            Ok(Ok(())) => trace!("subscription finished"),
            Ok(Err(_aborted)) => trace!("subscription released"),
            Err(payload) => debug!(panic = %panic_message(payload.as_ref()), "observer panicked"),
        }
        release_async_implicitly(releaser.as_ref()).await;
    }));
    Ok(handle)
}

async fn pump<S, T, E, O>(stream: S, mut observer: O)
where
    S: Stream<Item = Result<T, E>>,
    O: Observer<T, E>,
{
    let mut stream = std::pin::pin!(stream);
    while let Some(item) = stream.next().await {
        match item {
            Ok(value) => observer.on_next(value),
            Err(error) => {
                observer.on_error(error);
                return;
            }
        }
    }
    observer.on_completed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{AsyncRelease, Releasable};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Recording {
        items: Vec<u32>,
        errors: Vec<String>,
        completed: usize,
    }

    struct Recorder(Arc<Mutex<Recording>>);

    impl Observer<u32, String> for Recorder {
        fn on_next(&mut self, item: u32) {
            self.0.lock().items.push(item);
        }

        fn on_error(&mut self, error: String) {
            self.0.lock().errors.push(error);
        }

        fn on_completed(&mut self) {
            self.0.lock().completed += 1;
        }
    }

    fn recorder() -> (Arc<Mutex<Recording>>, Recorder) {
        let recording = Arc::new(Mutex::new(Recording::default()));
        (Arc::clone(&recording), Recorder(recording))
    }

    #[tokio::test]
    async fn test_completed_stream_releases_handle() {
        let (recording, observer) = recorder();
        let items = futures::stream::iter([1, 2, 3].map(Ok::<u32, String>));

        let handle = subscribe(items, observer).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        // May already be released on a fast pump; only count when accepted.
        let subscribed = handle
            .state()
            .subscribe(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .is_ok();

        handle.state().wait_released().await;
        let recording = recording.lock();
        assert_eq!(recording.items, vec![1, 2, 3]);
        assert_eq!(recording.completed, 1);
        assert!(recording.errors.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), usize::from(subscribed));
    }

    #[tokio::test]
    async fn test_error_ends_subscription_without_completion() {
        let (recording, observer) = recorder();
        let items = futures::stream::iter(vec![Ok(1), Err("bad frame".to_string()), Ok(3)]);

        let handle = subscribe(items, observer).unwrap();
        handle.state().wait_released().await;

        let recording = recording.lock();
        assert_eq!(recording.items, vec![1]);
        assert_eq!(recording.errors, vec!["bad frame".to_string()]);
        assert_eq!(recording.completed, 0);
    }

    #[tokio::test]
    async fn test_release_stops_pump_without_completion() {
        let (recording, observer) = recorder();
        let items = futures::stream::unfold(0_u32, |n| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Some((Ok::<u32, String>(n), n + 1))
        });

        let handle = subscribe(items, observer).unwrap();
        while recording.lock().items.len() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(handle.release_async().await.unwrap());

        let seen = recording.lock().items.len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let recording = recording.lock();
        assert_eq!(recording.items.len(), seen);
        assert_eq!(recording.completed, 0);
        assert!(handle.was_released());
    }

    #[tokio::test]
    async fn test_panicking_observer_still_releases_handle() {
        let items = futures::stream::iter([Ok::<u32, String>(1)]);
        let handle = subscribe(
            items,
            FnObserver::new(|_: u32| panic!("observer exploded")),
        )
        .unwrap();
        handle.state().wait_released().await;
        assert!(handle.was_released());
    }

    #[tokio::test]
    async fn test_fn_observer_callbacks() {
        let completed = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));
        let (done, sum) = (Arc::clone(&completed), Arc::clone(&total));
        let observer = FnObserver::new(move |n: usize| {
            sum.fetch_add(n, Ordering::SeqCst);
        })
        .with_completed(move || {
            done.fetch_add(1, Ordering::SeqCst);
        })
        .with_error(|_: std::io::Error| ());

        let handle = subscribe(futures::stream::iter([Ok(4), Ok(6)]), observer).unwrap();
        handle.state().wait_released().await;
        assert_eq!(total.load(Ordering::SeqCst), 10);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let (_, observer) = recorder();
        let items = futures::stream::iter([Ok::<u32, String>(1)]);
        assert!(matches!(
            subscribe(items, observer),
            Err(ReleaseError::NoRuntime { .. })
        ));
    }
}

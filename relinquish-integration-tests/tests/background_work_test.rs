//! Deferred cleanup and stream subscriptions owned by collections.
//!
//! Background work must stop once its owner is released, and a subscription
//! that ends on its own must drop out of the collection that owns it.

use futures::Stream;
use relinquish::{
    subscribe, AsyncRelease, AsyncReleaseCollection, CleanupMode, DeferredCleanup,
    DeferredCleanupConfig, FnObserver, Observer, Releasable, Release, ReleaseCollection,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn receiver_stream<T: Send + 'static>(
    receiver: mpsc::UnboundedReceiver<T>,
) -> impl Stream<Item = T> + Send + 'static {
    futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|item| (item, receiver))
    })
}

fn counting_cleanup(delay: Duration) -> (Arc<AtomicUsize>, Arc<DeferredCleanup>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let config = DeferredCleanupConfig::default()
        .with_delay(delay)
        .with_past_due_grace(Duration::from_millis(10));
    let cleanup = DeferredCleanup::with_config(config, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<(), std::io::Error>(())
    });
    (runs, Arc::new(cleanup))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_collection_release_cancels_pending_cleanup() {
    let collection = ReleaseCollection::new();
    let (runs, cleanup) = counting_cleanup(Duration::from_millis(40));
    collection.add(cleanup.clone()).unwrap();

    cleanup.set_cleanup(CleanupMode::Deferred).unwrap();
    assert!(cleanup.is_running());
    assert!(collection.release().unwrap());

    assert!(cleanup.was_released());
    assert!(!cleanup.is_running());
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // Scheduling after release is a quiet no-op.
    cleanup.set_cleanup(CleanupMode::ImmediateSynchronous).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cleanup_keeps_running_while_owner_is_alive() {
    let collection = ReleaseCollection::new();
    let (runs, cleanup) = counting_cleanup(Duration::from_millis(20));
    collection.add(cleanup.clone()).unwrap();

    cleanup.defer_cleanup().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(runs.load(Ordering::SeqCst) >= 1);
    assert!(cleanup.last_cleanup().is_some());

    collection.release().unwrap();
    let settled = runs.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(runs.load(Ordering::SeqCst), settled);
}

struct Totals {
    sum: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl Observer<usize, std::io::Error> for Totals {
    fn on_next(&mut self, item: usize) {
        self.sum.fetch_add(item, Ordering::SeqCst);
    }

    fn on_completed(&mut self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_finished_subscription_leaves_its_collection() {
    let collection = AsyncReleaseCollection::new();
    let (sender, receiver) = mpsc::unbounded_channel();
    let sum = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let observer = Totals {
        sum: Arc::clone(&sum),
        completed: Arc::clone(&completed),
    };

    let handle = subscribe(receiver_stream(receiver), observer).unwrap();
    collection.add_async(handle.clone()).unwrap();
    assert_eq!(collection.len(), 1);

    for n in 1..=4 {
        sender.send(Ok(n)).unwrap();
    }
    drop(sender);
    handle.state().wait_released().await;

    assert_eq!(sum.load(Ordering::SeqCst), 10);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(collection.is_empty());
    assert!(collection.release_async().await.unwrap());
}

#[tokio::test]
async fn test_releasing_collection_stops_live_subscription() {
    let collection = AsyncReleaseCollection::new();
    let (sender, receiver) = mpsc::unbounded_channel::<Result<usize, std::io::Error>>();
    let seen = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));
    let observer = FnObserver::new({
        let seen = Arc::clone(&seen);
        move |_: usize| {
            seen.fetch_add(1, Ordering::SeqCst);
        }
    })
    .with_completed({
        let completed = Arc::clone(&completed);
        move || {
            completed.fetch_add(1, Ordering::SeqCst);
        }
    });

    let handle = subscribe(receiver_stream(receiver), observer).unwrap();
    collection.add_async(handle.clone()).unwrap();
    sender.send(Ok(1)).unwrap();
    while seen.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    assert!(collection.release_async().await.unwrap());
    assert!(handle.was_released());
    // The pump is gone, so nothing reads this and the channel reports closed
    // once the spawned task drops the receiver.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(sender.send(Ok(2)).is_err());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_released_subscription_handle_is_a_no_op_the_second_time() {
    let (_sender, receiver) = mpsc::unbounded_channel::<Result<usize, std::io::Error>>();
    let handle = subscribe(receiver_stream(receiver), FnObserver::new(|_: usize| ())).unwrap();

    assert!(handle.release_async().await.unwrap());
    assert!(!handle.release_async().await.unwrap());
}

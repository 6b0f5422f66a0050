//! Background work example
//!
//! A cache owns a deferred cleanup timer and a subscription to an
//! invalidation feed. Both are members of one collection, so releasing the
//! cache stops the timer and the feed together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use relinquish::{
    subscribe, AsyncRelease, AsyncReleaseCollection, CleanupMode, DeferredCleanup,
    DeferredCleanupConfig, FnObserver, ReleaseError, ReleaseResult,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

type Entries = Arc<Mutex<HashMap<String, u64>>>;

#[tokio::main]
async fn main() -> ReleaseResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
    let owned = AsyncReleaseCollection::new();

    // Evict stale entries once writes have been quiet for a while.
    let evict = {
        let entries = Arc::clone(&entries);
        let config = DeferredCleanupConfig::default().with_delay(Duration::from_millis(30));
        Arc::new(DeferredCleanup::with_config(config, move || {
            let mut entries = entries.lock();
            let before = entries.len();
            entries.retain(|_, hits| *hits > 1);
            info!(evicted = before - entries.len(), "eviction pass");
            Ok::<(), ReleaseError>(())
        }))
    };
    owned.add_sync(evict.clone())?;

    // Keys named by the feed are dropped as they arrive.
    let feed = futures::stream::iter(["user:7", "user:9"])
        .then(|key| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, ReleaseError>(key.to_string())
        });
    let invalidations = {
        let entries = Arc::clone(&entries);
        subscribe(
            feed,
            FnObserver::new(move |key: String| {
                entries.lock().remove(&key);
                info!(%key, "invalidated");
            })
            .with_completed(|| info!("invalidation feed finished")),
        )?
    };
    owned.add_async(invalidations)?;

    for (key, hits) in [("user:7", 3), ("user:8", 1), ("user:9", 5), ("user:10", 2)] {
        entries.lock().insert(key.to_string(), hits);
        evict.set_cleanup(CleanupMode::Deferred)?;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("after quiet period: {:?}", entries.lock());
    println!("collection still owns {} member(s)", owned.len());

    owned.release_async().await?;
    println!("cache released; timer running = {}", evict.is_running());
    Ok(())
}

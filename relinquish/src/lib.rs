//! # relinquish
//!
//! Exactly-once, thread-safe release of resources.
//!
//! The building block is [`ReleaseState`], a four-state machine
//! (`Alive -> ReleaseRequested -> Releasing -> Released`) whose first
//! transition is a single compare-and-set. However many threads try to release
//! a resource at once, one of them runs the cleanup and the rest get a no-op.
//! Before cleanup begins the winner fires one-shot before-release listeners.
//!
//! On top of that:
//!
//! - [`Release`] / [`AsyncRelease`]: the sync and async release capabilities
//! - [`Releaser`] / [`AsyncReleaser`]: releasables backed by a closure
//! - [`ReleaseCollection`] / [`AsyncReleaseCollection`]: owned-resource
//!   collections that release every member once on teardown and forget
//!   members that were released on their own
//! - [`ReleaseGuard`]: releases its resource at the end of a scope
//! - [`DeferredCleanup`]: runs housekeeping after a quiet period
//! - [`subscribe`]: pumps a stream into an observer until released
//! - [`monitor`]: finds tracked resources that were never released
//!
//! ```rust
//! use relinquish::{Release, ReleaseCollection, Releaser};
//! use std::sync::Arc;
//!
//! let connections = ReleaseCollection::new();
//! for id in 0..3 {
//!     connections.add(Arc::new(Releaser::from_fn(move || println!("closing {id}"))))?;
//! }
//!
//! // Closes 2, 1, 0.
//! assert!(connections.release()?);
//! assert!(!connections.release()?);
//! # Ok::<(), relinquish::ReleaseError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod collection;
pub mod deferred;
pub mod errors;
pub mod lifecycle;
pub mod monitor;
pub mod release;
pub mod releaser;
pub mod state;
pub mod subscription;
pub mod types;

#[cfg(feature = "testing")]
pub mod testing;

pub use collection::{AsyncReleaseCollection, Member, ReleaseCollection};
pub use deferred::{CleanupMode, DeferredCleanup, DeferredCleanupConfig};
pub use errors::{BoxError, ReleaseError, ReleaseResult};
pub use lifecycle::{AsyncReleaseGuard, ReleaseExt, ReleaseGuard};
pub use monitor::{global_leak_detector, LeakDetector, LeakReport, LeakStats};
pub use release::{
    release_all, release_all_async, release_async_implicitly, release_implicitly,
    release_with_mode, AsyncRelease, Releasable, Release,
};
pub use releaser::{AsyncReleaser, Releaser};
pub use state::ReleaseState;
pub use subscription::{subscribe, FnObserver, Observer};
pub use types::{LifecycleState, ListenerId, ReleaseMode, ResourceId, ResourceName};

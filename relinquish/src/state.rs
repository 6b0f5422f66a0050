//! The release state machine.
//!
//! [`ReleaseState`] tracks one resource through
//! `Alive -> ReleaseRequested -> Releasing -> Released`. The only transition
//! callers can trigger is the first one, and it is a single atomic
//! compare-and-set: however many threads race to release a resource, exactly
//! one of them wins and every other caller gets a no-op.
//!
//! The winner fires the before-release listeners while the resource is still
//! nominally usable, then the state advances to `Releasing`. Once the cleanup
//! work is done the owner calls [`ReleaseState::mark_released`].
//!
//! Types that want the whole protocol without writing it out should use
//! [`ReleaseState::run_release`] or [`ReleaseState::run_release_async`].
//!
//! # Example
//!
//! ```rust
//! use relinquish::{LifecycleState, ReleaseState};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let state = ReleaseState::new();
//! let fired = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&fired);
//! state.subscribe(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! })?;
//!
//! assert!(state.request_release());
//! assert!(!state.request_release());
//! assert_eq!(state.state(), LifecycleState::Releasing);
//!
//! state.mark_released();
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! # Ok::<(), relinquish::ReleaseError>(())
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::errors::{ReleaseError, ReleaseResult};
use crate::monitor::global_leak_detector;
use crate::types::{LifecycleState, ListenerId, ResourceId, ResourceName};

type Listener = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: BTreeMap<u64, Listener>,
}

/// Per-resource release state with one-shot before-release notification.
pub struct ReleaseState {
    state: AtomicU8,
    name: Cow<'static, str>,
    listeners: Mutex<Listeners>,
    released: Notify,
    resource_id: Option<ResourceId>,
}

impl ReleaseState {
    /// Creates an alive, untracked state.
    pub fn new() -> Self {
        Self::labelled(Cow::Borrowed("resource"), None)
    }

    /// Creates an alive state whose name shows up in errors and logs.
    pub fn named(name: ResourceName) -> Self {
        Self::labelled(Cow::Owned(name.into_inner()), None)
    }

    /// Creates an alive state registered with the global leak detector.
    ///
    /// The registration is dropped when the state is marked released, so
    /// anything still listed by [`crate::monitor::LeakDetector::stats`] was
    /// never released.
    #[track_caller]
    pub fn tracked(name: ResourceName) -> Self {
        let location = Location::caller();
        let id = ResourceId::new();
        global_leak_detector().register_acquisition(
            id,
            name.as_ref(),
            Some(format!("{}:{}:{}", location.file(), location.line(), location.column())),
        );
        Self::labelled(Cow::Owned(name.into_inner()), Some(id))
    }

    pub(crate) fn with_label(label: &'static str) -> Self {
        Self::labelled(Cow::Borrowed(label), None)
    }

    fn labelled(name: Cow<'static, str>, resource_id: Option<ResourceId>) -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Alive as u8),
            name,
            listeners: Mutex::new(Listeners::default()),
            released: Notify::new(),
            resource_id,
        }
    }

    /// The name used in errors and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The leak detector registration, if this state is tracked.
    pub const fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id
    }

    /// Snapshot of the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True until release has been requested.
    pub fn is_alive(&self) -> bool {
        self.state() == LifecycleState::Alive
    }

    /// True once the resource is `Releasing` or `Released`.
    ///
    /// A resource in `ReleaseRequested` is neither alive nor released: its
    /// listeners are running and may still use it.
    pub fn was_released(&self) -> bool {
        self.state().was_released()
    }

    /// Fails with [`ReleaseError::AlreadyReleased`] once the resource is no
    /// longer usable.
    pub fn assert_alive(&self) -> ReleaseResult<()> {
        if self.was_released() {
            return Err(ReleaseError::already_released(self.name()));
        }
        Ok(())
    }

    /// Registers a listener fired once, right before release begins.
    ///
    /// Fails once release has been requested. A listener registered while
    /// another thread is requesting release is either fired by that release
    /// or rejected here; it is never fired twice and never after
    /// [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(&self, listener: F) -> ReleaseResult<ListenerId>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut listeners = self.listeners.lock();
        // Checked under the lock so the drain in fire_before_release cannot
        // miss an entry inserted after the state left Alive.
        if !self.is_alive() {
            return Err(ReleaseError::already_released(self.name()));
        }
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.insert(id, Box::new(listener));
        trace!(resource = %self.name, listener = id, "before-release listener added");
        Ok(ListenerId(id))
    }

    /// Removes a listener. Returns false if it was already fired or removed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.lock().entries.remove(&id.0).is_some()
    }

    /// Number of listeners still waiting to fire.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }

    /// Attempts to move from `Alive` to `ReleaseRequested`.
    ///
    /// Returns true for exactly one caller over the lifetime of the state.
    /// That caller has fired the before-release listeners by the time this
    /// returns, the state is `Releasing`, and it is now responsible for
    /// calling [`mark_released`](Self::mark_released).
    ///
    /// If a listener panics the state still advances to `Releasing` before
    /// the panic propagates.
    pub fn request_release(&self) -> bool {
        self.request_release_with(|| ())
    }

    /// Like [`request_release`](Self::request_release), running `hook` before
    /// the listeners when this caller wins.
    pub fn request_release_with<H>(&self, hook: H) -> bool
    where
        H: FnOnce(),
    {
        if !self.try_begin() {
            return false;
        }
        self.fire_before_release(hook);
        true
    }

    /// Moves to `Released`. Idempotent.
    ///
    /// Wakes everything parked in [`wait_released`](Self::wait_released).
    pub fn mark_released(&self) {
        let previous =
            LifecycleState::from_u8(self.state.swap(LifecycleState::Released as u8, Ordering::AcqRel));
        if previous == LifecycleState::Released {
            return;
        }
        // Listeners that never fired (mark_released without request_release)
        // must not linger.
        let pending = std::mem::take(&mut self.listeners.lock().entries);
        drop(pending);
        if let Some(id) = self.resource_id {
            global_leak_detector().register_release(id);
        }
        trace!(resource = %self.name, from = ?previous, "released");
        self.released.notify_waiters();
    }

    /// Resolves once the state is `Released`.
    pub async fn wait_released(&self) {
        loop {
            let mut notified = std::pin::pin!(self.released.notified());
            notified.as_mut().enable();
            if self.state() == LifecycleState::Released {
                return;
            }
            notified.await;
        }
    }

    /// Runs the synchronous release protocol.
    ///
    /// Returns `Ok(false)` without calling `routine` if another caller won.
    /// Otherwise fires the listeners, runs `routine`, and marks the state
    /// released whether the routine succeeds, fails or panics. A routine error
    /// is returned to the caller; user errors arrive as
    /// [`ReleaseError::RoutineFailed`].
    pub fn run_release<F, E>(&self, routine: F) -> ReleaseResult<bool>
    where
        F: FnOnce() -> Result<(), E>,
        E: Into<ReleaseError>,
    {
        if !self.try_begin() {
            return Ok(false);
        }
        let _released = MarkReleasedOnDrop(self);
        self.fire_before_release(|| ());
        routine().map_err(Into::into)?;
        Ok(true)
    }

    /// Runs the asynchronous release protocol.
    ///
    /// The winner awaits `routine` and then marks the state released. Losers
    /// do not return until the winner has finished, so every caller observes
    /// a completed release. If the winning future is dropped before it
    /// completes, the state is still marked released.
    pub async fn run_release_async<F, Fut, E>(&self, routine: F) -> ReleaseResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<ReleaseError>,
    {
        if !self.try_begin() {
            self.wait_released().await;
            return Ok(false);
        }
        let _released = MarkReleasedOnDrop(self);
        self.fire_before_release(|| ());
        routine().await.map_err(Into::into)?;
        Ok(true)
    }

    fn try_begin(&self) -> bool {
        // Cheap read first; most late callers never touch the CAS.
        self.state.load(Ordering::Acquire) == LifecycleState::Alive as u8
            && self
                .state
                .compare_exchange(
                    LifecycleState::Alive as u8,
                    LifecycleState::ReleaseRequested as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }

    fn fire_before_release<H: FnOnce()>(&self, hook: H) {
        let _advance = AdvanceOnDrop(self);
        trace!(resource = %self.name, "release requested");
        hook();
        let drained = std::mem::take(&mut self.listeners.lock().entries);
        for (_, listener) in drained {
            listener();
        }
    }
}

impl Default for ReleaseState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseState")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .field("resource_id", &self.resource_id)
            .finish()
    }
}

impl Drop for ReleaseState {
    fn drop(&mut self) {
        if self.is_alive() {
            warn!(resource = %self.name, "dropped without being released");
            if let Some(id) = self.resource_id {
                global_leak_detector().register_release(id);
            }
        }
    }
}

/// Advances `ReleaseRequested -> Releasing`, even when a listener panics.
struct AdvanceOnDrop<'a>(&'a ReleaseState);

impl Drop for AdvanceOnDrop<'_> {
    fn drop(&mut self) {
        // Never regress: mark_released may already have run from a listener.
        let _ = self.0.state.compare_exchange(
            LifecycleState::ReleaseRequested as u8,
            LifecycleState::Releasing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

struct MarkReleasedOnDrop<'a>(&'a ReleaseState);

impl Drop for MarkReleasedOnDrop<'_> {
    fn drop(&mut self) {
        self.0.mark_released();
    }
}

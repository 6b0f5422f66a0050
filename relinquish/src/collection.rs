//! Owned-resource collections.
//!
//! A collection owns a dynamic set of resources and releases every member,
//! exactly once each, when it is released itself. Members that are released
//! on their own first are forgotten the moment their release begins, so the
//! collection never releases anything twice.
//!
//! Members are drained most recently added first. The ordering is a policy
//! choice: nothing depends on it other than callers who find stack-like
//! teardown natural.
//!
//! The membership lock guards bookkeeping only. Each member is unlinked under
//! the lock and released after it is dropped, so member routines may freely
//! call back into the collection.
//!
//! # Example
//!
//! ```rust
//! use relinquish::{Release, ReleaseCollection, Releaser};
//! use std::sync::Arc;
//!
//! let collection = ReleaseCollection::new();
//! let a = Arc::new(Releaser::from_fn(|| ()));
//! let b = Arc::new(Releaser::from_fn(|| ()));
//! collection.add(a.clone())?;
//! collection.add(b.clone())?;
//!
//! b.release()?;
//! assert_eq!(collection.len(), 1);
//!
//! collection.release()?;
//! assert!(collection.is_empty());
//! # Ok::<(), relinquish::ReleaseError>(())
//! ```

mod membership;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::deferred::DeferredCleanup;
use crate::errors::{ReleaseError, ReleaseResult};
use crate::release::{AsyncRelease, Release, Releasable};
use crate::releaser::{AsyncReleaser, Releaser};
use crate::state::ReleaseState;
use membership::{key_of, MemberKey, Membership};

/// A member of an [`AsyncReleaseCollection`], classified once when added.
#[derive(Clone)]
pub enum Member {
    /// Released with [`Release::release`].
    Sync(Arc<dyn Release>),
    /// Released with [`AsyncRelease::release_async`].
    Async(Arc<dyn AsyncRelease>),
}

const CLASSIFIABLE: &str =
    "Releaser, AsyncReleaser, ReleaseCollection, AsyncReleaseCollection or DeferredCleanup";

impl Member {
    /// Wraps a synchronously released resource.
    pub fn from_sync<R: Release + 'static>(resource: Arc<R>) -> Self {
        Self::Sync(resource)
    }

    /// Wraps an asynchronously released resource.
    pub fn from_async<R: AsyncRelease + 'static>(resource: Arc<R>) -> Self {
        Self::Async(resource)
    }

    /// Classifies a type-erased value.
    ///
    /// Recognizes the releasable types this crate defines. Anything else is
    /// rejected with [`ReleaseError::UnsupportedMember`]; wrap custom types
    /// with [`from_sync`](Self::from_sync) or [`from_async`](Self::from_async)
    /// instead.
    pub fn classify(value: Arc<dyn Any + Send + Sync>) -> ReleaseResult<Self> {
        let value = match value.downcast::<Releaser>() {
            Ok(resource) => return Ok(Self::Sync(resource)),
            Err(value) => value,
        };
        let value = match value.downcast::<ReleaseCollection>() {
            Ok(resource) => return Ok(Self::Sync(resource)),
            Err(value) => value,
        };
        let value = match value.downcast::<DeferredCleanup>() {
            Ok(resource) => return Ok(Self::Sync(resource)),
            Err(value) => value,
        };
        let value = match value.downcast::<AsyncReleaser>() {
            Ok(resource) => return Ok(Self::Async(resource)),
            Err(value) => value,
        };
        match value.downcast::<AsyncReleaseCollection>() {
            Ok(resource) => Ok(Self::Async(resource)),
            Err(_) => Err(ReleaseError::UnsupportedMember {
                expected: CLASSIFIABLE,
            }),
        }
    }

    /// Releases the member, awaiting it if it is asynchronous.
    pub async fn release(&self) -> ReleaseResult<bool> {
        match self {
            Self::Sync(resource) => resource.release(),
            Self::Async(resource) => resource.release_async().await,
        }
    }

    /// The state machine of the wrapped resource, if it exposes one.
    pub fn release_state(&self) -> Option<&ReleaseState> {
        match self {
            Self::Sync(resource) => resource.release_state(),
            Self::Async(resource) => resource.release_state(),
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Sync(_) => "Sync",
            Self::Async(_) => "Async",
        };
        f.debug_tuple(kind).field(&self.release_state()).finish()
    }
}

/// What the shared bookkeeping needs from a member.
trait Tracked: Send + Sync + 'static {
    fn key(&self) -> MemberKey;
    fn state(&self) -> Option<&ReleaseState>;
}

impl Tracked for Arc<dyn Release> {
    fn key(&self) -> MemberKey {
        key_of(self)
    }

    fn state(&self) -> Option<&ReleaseState> {
        self.release_state()
    }
}

impl Tracked for Member {
    fn key(&self) -> MemberKey {
        match self {
            Self::Sync(resource) => key_of(resource),
            Self::Async(resource) => key_of(resource),
        }
    }

    fn state(&self) -> Option<&ReleaseState> {
        self.release_state()
    }
}

/// State and membership shared with the self-deregistration listeners.
struct Core<M> {
    state: ReleaseState,
    members: Mutex<Membership<M>>,
}

impl<M: Tracked> Core<M> {
    fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            state: ReleaseState::with_label(label),
            members: Mutex::new(Membership::default()),
        })
    }

    fn add(self: &Arc<Self>, member: M) -> ReleaseResult<()> {
        let key = member.key();
        let mut members = self.members.lock();
        if !self.state.is_alive() {
            return Err(ReleaseError::already_released(self.state.name()));
        }
        if members.contains(key) {
            return Err(ReleaseError::InvalidArgument {
                name: "resource",
                reason: "already a member of this collection".to_string(),
            });
        }
        // A member whose release starts concurrently blocks in forget() on
        // the lock held here, so it is unlinked right after insertion.
        let listener = match member.state() {
            Some(state) => Some(state.subscribe(Self::deregistration(Arc::downgrade(self), key))?),
            None => None,
        };
        members.push_front(key, member, listener)?;
        trace!(collection = %self.state.name(), members = members.len(), "member added");
        Ok(())
    }

    fn deregistration(owner: Weak<Self>, key: MemberKey) -> impl FnOnce() + Send + 'static {
        move || {
            if let Some(owner) = owner.upgrade() {
                owner.forget(key);
            }
        }
    }

    /// Unlinks a member whose own release has begun.
    fn forget(&self, key: MemberKey) {
        let removed = self.members.lock().remove(key);
        match removed {
            Ok(Some(_)) => trace!(collection = %self.state.name(), "member released itself"),
            Ok(None) => {}
            Err(err) => error!(
                collection = %self.state.name(),
                error = %err,
                "failed to deregister released member"
            ),
        }
    }

    fn remove(&self, key: MemberKey) -> ReleaseResult<bool> {
        let removed = self.members.lock().remove(key)?;
        let Some(node) = removed else {
            return Ok(false);
        };
        if let (Some(id), Some(state)) = (node.listener, node.member.state()) {
            state.unsubscribe(id);
        }
        Ok(true)
    }

    fn clear(&self) -> ReleaseResult<Vec<M>> {
        let drained = {
            let mut members = self.members.lock();
            if !self.state.is_alive() {
                return Err(ReleaseError::already_released(self.state.name()));
            }
            members.drain()?
        };
        Ok(drained
            .into_iter()
            .map(|node| {
                if let (Some(id), Some(state)) = (node.listener, node.member.state()) {
                    state.unsubscribe(id);
                }
                node.member
            })
            .collect())
    }

    /// Unlinks the most recently added member, detaching its listener.
    fn take_first(&self) -> ReleaseResult<Option<M>> {
        let node = self.members.lock().pop_front()?;
        Ok(node.map(|node| {
            if let (Some(id), Some(state)) = (node.listener, node.member.state()) {
                state.unsubscribe(id);
            }
            node.member
        }))
    }

    fn len(&self) -> usize {
        self.members.lock().len()
    }

    fn contains(&self, key: MemberKey) -> bool {
        self.members.lock().contains(key)
    }

    fn finish_drain(&self, released: usize, failures: Vec<ReleaseError>) -> ReleaseResult<()> {
        debug_assert!(self.members.lock().is_empty());
        debug!(
            collection = %self.state.name(),
            released,
            failed = failures.len(),
            "collection drained"
        );
        ReleaseError::from_failures(failures)
    }
}

impl Core<Arc<dyn Release>> {
    fn drain(&self) -> ReleaseResult<()> {
        let mut released = 0;
        let mut failures = Vec::new();
        loop {
            match self.take_first() {
                Ok(Some(member)) => match member.release() {
                    Ok(performed) => released += usize::from(performed),
                    Err(err) => failures.push(err),
                },
                Ok(None) => break,
                Err(err) => {
                    failures.push(err);
                    break;
                }
            }
        }
        self.finish_drain(released, failures)
    }
}

impl Core<Member> {
    async fn drain(&self) -> ReleaseResult<()> {
        let mut released = 0;
        let mut failures = Vec::new();
        loop {
            match self.take_first() {
                Ok(Some(member)) => match member.release().await {
                    Ok(performed) => released += usize::from(performed),
                    Err(err) => failures.push(err),
                },
                Ok(None) => break,
                Err(err) => {
                    failures.push(err);
                    break;
                }
            }
        }
        self.finish_drain(released, failures)
    }
}

/// A collection of synchronously released resources.
///
/// Releasing the collection releases every member still in it, continuing
/// past failures. Failures are returned together once the drain finishes.
pub struct ReleaseCollection {
    core: Arc<Core<Arc<dyn Release>>>,
}

impl ReleaseCollection {
    /// Creates an empty, alive collection.
    pub fn new() -> Self {
        Self {
            core: Core::new("ReleaseCollection"),
        }
    }

    /// Adds a resource at the head of the membership.
    ///
    /// Fails with [`ReleaseError::AlreadyReleased`] once the collection has
    /// begun release, and with [`ReleaseError::InvalidArgument`] if the same
    /// allocation is already a member.
    pub fn add(&self, resource: Arc<dyn Release>) -> ReleaseResult<()> {
        self.core.add(resource)
    }

    /// Removes a resource without releasing it.
    ///
    /// Returns false if it was not a member.
    pub fn remove<T: ?Sized>(&self, resource: &Arc<T>) -> ReleaseResult<bool> {
        self.core.remove(key_of(resource))
    }

    /// Detaches every member without releasing it, newest first.
    pub fn clear(&self) -> ReleaseResult<Vec<Arc<dyn Release>>> {
        self.core.clear()
    }

    /// Whether the allocation behind `resource` is a member.
    pub fn contains<T: ?Sized>(&self, resource: &Arc<T>) -> bool {
        self.core.contains(key_of(resource))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// True when there are no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReleaseCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Releasable for ReleaseCollection {
    fn release_state(&self) -> Option<&ReleaseState> {
        Some(&self.core.state)
    }
}

impl Release for ReleaseCollection {
    fn release(&self) -> ReleaseResult<bool> {
        self.core.state.run_release(|| self.core.drain())
    }
}

impl fmt::Debug for ReleaseCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseCollection")
            .field("state", &self.core.state.state())
            .field("members", &self.len())
            .finish()
    }
}

/// A collection of synchronously or asynchronously released resources.
///
/// The drain awaits each asynchronous member before moving to the next.
pub struct AsyncReleaseCollection {
    core: Arc<Core<Member>>,
}

impl AsyncReleaseCollection {
    /// Creates an empty, alive collection.
    pub fn new() -> Self {
        Self {
            core: Core::new("AsyncReleaseCollection"),
        }
    }

    /// Adds a classified member at the head of the membership.
    pub fn add(&self, member: Member) -> ReleaseResult<()> {
        self.core.add(member)
    }

    /// Adds a synchronously released resource.
    pub fn add_sync(&self, resource: Arc<dyn Release>) -> ReleaseResult<()> {
        self.add(Member::Sync(resource))
    }

    /// Adds an asynchronously released resource.
    pub fn add_async(&self, resource: Arc<dyn AsyncRelease>) -> ReleaseResult<()> {
        self.add(Member::Async(resource))
    }

    /// Classifies and adds a type-erased value.
    ///
    /// Fails with [`ReleaseError::UnsupportedMember`] before touching the
    /// membership if the value is not a recognized releasable.
    pub fn add_any(&self, value: Arc<dyn Any + Send + Sync>) -> ReleaseResult<()> {
        self.add(Member::classify(value)?)
    }

    /// Removes a resource without releasing it.
    pub fn remove<T: ?Sized>(&self, resource: &Arc<T>) -> ReleaseResult<bool> {
        self.core.remove(key_of(resource))
    }

    /// Detaches every member without releasing it, newest first.
    pub fn clear(&self) -> ReleaseResult<Vec<Member>> {
        self.core.clear()
    }

    /// Whether the allocation behind `resource` is a member.
    pub fn contains<T: ?Sized>(&self, resource: &Arc<T>) -> bool {
        self.core.contains(key_of(resource))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// True when there are no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AsyncReleaseCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Releasable for AsyncReleaseCollection {
    fn release_state(&self) -> Option<&ReleaseState> {
        Some(&self.core.state)
    }
}

#[async_trait]
impl AsyncRelease for AsyncReleaseCollection {
    async fn release_async(&self) -> ReleaseResult<bool> {
        self.core.state.run_release_async(|| self.core.drain()).await
    }
}

impl fmt::Debug for AsyncReleaseCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncReleaseCollection")
            .field("state", &self.core.state.state())
            .field("members", &self.len())
            .finish()
    }
}

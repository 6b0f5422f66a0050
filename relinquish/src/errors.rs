//! Error types for relinquish.
//!
//! Every fallible operation in the crate returns [`ReleaseResult`]. The
//! variants of [`ReleaseError`] fall into four groups:
//!
//! - **Invalid state**: the target has already begun or completed release
//!   (`AlreadyReleased`), or the operation needs a runtime that is not there
//!   (`NoRuntime`).
//! - **Argument**: input rejected before any state was touched
//!   (`InvalidArgument`, `UnsupportedMember`).
//! - **Internal consistency**: collection bookkeeping disagrees with itself
//!   (`Inconsistent`). This means the collection was mutated outside its lock
//!   and is never retried.
//! - **Release failure**: the user-supplied routine failed (`RoutineFailed`),
//!   or one or more collection members did (`MembersFailed`). A routine that
//!   panics on an explicit path unwinds to the caller; implicit paths log the
//!   panic and absorb it.
//!
//! Asking to release something that is already released is *not* an error:
//! the release entry points return `Ok(false)` for that case.
//!
//! # Example
//!
//! ```rust
//! use relinquish::{Release, Releaser, ReleaseError};
//!
//! let releaser = Releaser::new(|| Err::<(), _>("disk unplugged"));
//!
//! match releaser.release() {
//!     Err(ReleaseError::RoutineFailed(source)) => {
//!         assert_eq!(source.to_string(), "disk unplugged");
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//!
//! // The resource is released anyway; a second call is a no-op.
//! assert_eq!(releaser.release().unwrap(), false);
//! ```

use thiserror::Error;

/// Boxed error produced by user-supplied release routines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while registering, tracking or releasing resources.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The resource has already begun or completed release.
    #[error("{resource} has already been released")]
    AlreadyReleased {
        /// Name of the resource that was no longer usable
        resource: String,
    },

    /// The operation needs a tokio runtime and none is running.
    #[error("no async runtime available to {operation}")]
    NoRuntime {
        /// What was being attempted
        operation: &'static str,
    },

    /// An argument was rejected before any state was mutated.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// The offending parameter
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A type-erased value offered to a collection is not one of the
    /// releasable types the collection can recognize.
    #[error("unsupported collection member; expected {expected}")]
    UnsupportedMember {
        /// The types that are accepted
        expected: &'static str,
    },

    /// Collection bookkeeping structures disagree.
    #[error("collection bookkeeping is inconsistent (potential concurrent access): {0}")]
    Inconsistent(String),

    /// The release routine returned an error.
    #[error("release routine failed: {0}")]
    RoutineFailed(#[from] BoxError),

    /// One or more members of a collection failed to release.
    #[error("{} member(s) failed to release", .0.len())]
    MembersFailed(Vec<ReleaseError>),
}

impl ReleaseError {
    /// Creates an `AlreadyReleased` error for the named resource.
    pub fn already_released(resource: impl Into<String>) -> Self {
        Self::AlreadyReleased {
            resource: resource.into(),
        }
    }

    /// Returns true for the invalid-state group.
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::AlreadyReleased { .. } | Self::NoRuntime { .. })
    }

    /// Returns true when the error came out of a release routine.
    pub const fn is_release_failure(&self) -> bool {
        matches!(self, Self::RoutineFailed(_) | Self::MembersFailed(_))
    }

    /// Builds the error for a collection drain from the failures it collected.
    ///
    /// Returns `Ok(())` when nothing failed and unwraps a single failure so
    /// callers see the original error rather than a one-element aggregate.
    pub(crate) fn from_failures(mut failures: Vec<Self>) -> ReleaseResult<()> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Self::MembersFailed(failures)),
        }
    }
}

/// Type alias for release operation results.
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Renders a panic payload for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

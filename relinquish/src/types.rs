//! Core types shared across the crate.
//!
//! Validated types use smart constructors, so a value that exists is a value
//! that is valid.

use std::fmt;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ReleaseError, ReleaseResult};

/// Progress of a resource through its release lifecycle.
///
/// States are ordered: `Alive < ReleaseRequested < Releasing < Released`.
/// A resource only ever moves forward through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LifecycleState {
    /// Usable, release not yet requested.
    Alive = 0,
    /// Release was granted to one caller; before-release listeners are
    /// running and the resource is still nominally usable.
    ReleaseRequested = 1,
    /// Cleanup is in progress. No longer usable.
    Releasing = 2,
    /// Cleanup has finished.
    Released = 3,
}

impl LifecycleState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Alive,
            1 => Self::ReleaseRequested,
            2 => Self::Releasing,
            _ => Self::Released,
        }
    }

    /// True for `Releasing` and `Released`.
    pub const fn was_released(self) -> bool {
        matches!(self, Self::Releasing | Self::Released)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alive => "alive",
            Self::ReleaseRequested => "release requested",
            Self::Releasing => "releasing",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

/// How a release was initiated.
///
/// Failures on an explicit release propagate to the caller. Failures on an
/// implicit release (scope guard drop, background task, timer) have no caller
/// to go to, so they are logged at `debug` level and absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseMode {
    /// Requested directly by user code.
    Explicit,
    /// Triggered by teardown the user did not call for directly.
    Implicit,
}

/// A human readable resource name used in logs, errors and leak reports.
///
/// Names are trimmed, must not be empty and are at most 128 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 128),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ResourceName(String);

impl ResourceName {
    /// Validates a name, reporting failures as [`ReleaseError::InvalidArgument`].
    pub fn parse(name: impl Into<String>) -> ReleaseResult<Self> {
        Self::try_new(name.into()).map_err(|e| ReleaseError::InvalidArgument {
            name: "name",
            reason: e.to_string(),
        })
    }
}

/// Identifies one registration in the leak detector.
///
/// Uses `UUIDv7` so ids sort by registration time.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Creates a new id with the current timestamp.
    pub fn new() -> Self {
        // Uuid::now_v7() always yields a v7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Token returned when subscribing a before-release listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_order() {
        assert!(LifecycleState::Alive < LifecycleState::ReleaseRequested);
        assert!(LifecycleState::ReleaseRequested < LifecycleState::Releasing);
        assert!(LifecycleState::Releasing < LifecycleState::Released);
    }

    #[test]
    fn test_lifecycle_roundtrips_through_u8() {
        for state in [
            LifecycleState::Alive,
            LifecycleState::ReleaseRequested,
            LifecycleState::Releasing,
            LifecycleState::Released,
        ] {
            assert_eq!(LifecycleState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_was_released_covers_releasing() {
        assert!(!LifecycleState::Alive.was_released());
        assert!(!LifecycleState::ReleaseRequested.was_released());
        assert!(LifecycleState::Releasing.was_released());
        assert!(LifecycleState::Released.was_released());
    }

    #[test]
    fn test_lifecycle_serializes_by_name() {
        let json = serde_json::to_string(&LifecycleState::ReleaseRequested).unwrap();
        assert_eq!(json, "\"ReleaseRequested\"");
        assert_eq!(LifecycleState::Releasing.to_string(), "releasing");
    }

    #[test]
    fn test_resource_name_validation() {
        let name = ResourceName::parse("  db-pool  ").unwrap();
        assert_eq!(name.as_ref(), "db-pool");

        let err = ResourceName::parse("   ").unwrap_err();
        assert!(matches!(err, ReleaseError::InvalidArgument { name: "name", .. }));

        assert!(ResourceName::parse("x".repeat(129)).is_err());
        assert!(ResourceName::parse("x".repeat(128)).is_ok());
    }

    #[test]
    fn test_resource_ids_are_unique() {
        let first = ResourceId::new();
        let second = ResourceId::new();
        assert_ne!(first, second);
        assert_eq!(first.as_ref().get_version(), Some(uuid::Version::SortRand));
    }
}

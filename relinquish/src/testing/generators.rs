//! Property test generators.
//!
//! Each generator respects the validation rules of the type it produces.

use proptest::prelude::*;

use crate::deferred::CleanupMode;
use crate::types::{LifecycleState, ReleaseMode, ResourceName};

/// Generates valid `ResourceName` values.
pub fn arb_resource_name() -> impl Strategy<Value = ResourceName> {
    "[a-zA-Z][a-zA-Z0-9 ._-]{0,63}"
        .prop_filter_map("Invalid ResourceName", |s| ResourceName::try_new(s).ok())
}

/// Generates any `LifecycleState`.
pub fn arb_lifecycle_state() -> impl Strategy<Value = LifecycleState> {
    prop_oneof![
        Just(LifecycleState::Alive),
        Just(LifecycleState::ReleaseRequested),
        Just(LifecycleState::Releasing),
        Just(LifecycleState::Released),
    ]
}

/// Generates any `ReleaseMode`.
pub fn arb_release_mode() -> impl Strategy<Value = ReleaseMode> {
    prop_oneof![Just(ReleaseMode::Explicit), Just(ReleaseMode::Implicit)]
}

/// Generates any `CleanupMode`.
pub fn arb_cleanup_mode() -> impl Strategy<Value = CleanupMode> {
    prop_oneof![
        Just(CleanupMode::ImmediateSynchronous),
        Just(CleanupMode::ImmediateSynchronousIfPastDue),
        Just(CleanupMode::ImmediateDeferred),
        Just(CleanupMode::ImmediateDeferredIfPastDue),
        Just(CleanupMode::Deferred),
    ]
}

/// One step applied to a collection in a property test.
///
/// Indices refer to resources created so far and are taken modulo their
/// count, so every generated sequence is applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionOp {
    /// Create a resource and add it.
    Add,
    /// Remove a previously created resource.
    Remove(usize),
    /// Release a previously created resource on its own.
    ReleaseMember(usize),
    /// Detach every member.
    Clear,
}

/// Generates a single collection operation, weighted towards `Add`.
pub fn arb_collection_op() -> impl Strategy<Value = CollectionOp> {
    prop_oneof![
        4 => Just(CollectionOp::Add),
        2 => any::<usize>().prop_map(CollectionOp::Remove),
        2 => any::<usize>().prop_map(CollectionOp::ReleaseMember),
        1 => Just(CollectionOp::Clear),
    ]
}

/// Generates up to `max_len` collection operations.
pub fn arb_collection_ops(max_len: usize) -> impl Strategy<Value = Vec<CollectionOp>> {
    prop::collection::vec(arb_collection_op(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_names_are_valid(name in arb_resource_name()) {
            prop_assert!(!name.as_ref().is_empty());
            prop_assert_eq!(name.as_ref(), name.as_ref().trim());
            prop_assert!(name.as_ref().chars().count() <= 128);
        }

        #[test]
        fn generated_op_sequences_respect_length(ops in arb_collection_ops(16)) {
            prop_assert!(ops.len() <= 16);
        }
    }
}

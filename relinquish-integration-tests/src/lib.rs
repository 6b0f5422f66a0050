//! Integration tests for `relinquish`
//!
//! The tests in this crate drive the library through its public API only:
//! releasers, collections, guards, deferred cleanup and stream subscriptions
//! working together under contention.

// This is a test-only crate
#![cfg(test)]

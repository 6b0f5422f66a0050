//! Example programs using the `relinquish` resource release library
//!
//! The [`pool`] module is a small connection pool whose connections, leases
//! and shutdown are all expressed through `relinquish` collections.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// These are examples, so we don't need to be as pedantic
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::use_self)]

/// Connection pool example: connections owned by a pool, leases that return
/// connections on drop, and an async shutdown that closes everything once
pub mod pool;

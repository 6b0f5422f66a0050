//! relinquish Benchmarks
//!
//! This crate contains performance benchmarks for the relinquish library:
//! the release state machine under contention and the owned-resource
//! collections' add, remove and drain paths.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

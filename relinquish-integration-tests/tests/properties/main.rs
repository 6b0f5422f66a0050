//! Property tests for relinquish.

mod collection_model;
mod exactly_once;
mod value_types;

//! Validated pool configuration and errors.

use nutype::nutype;
use relinquish::ReleaseError;
use thiserror::Error;

/// Address a pool connects to, e.g. `db.internal:5432`.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(Debug, Clone, PartialEq, Eq, AsRef, Display)
)]
pub struct Endpoint(String);

/// Maximum number of open connections in a pool.
#[nutype(
    validate(greater = 0, less_or_equal = 64),
    derive(Debug, Clone, Copy, PartialEq, Eq, Into)
)]
pub struct PoolSize(usize);

/// Errors returned by the example pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every connection is leased out.
    #[error("all {0} connections are in use")]
    Exhausted(usize),

    /// An endpoint or size failed validation.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The pool has been shut down.
    #[error("pool for {0} is shut down")]
    Closed(String),

    /// A connection or the pool itself could not be released.
    #[error(transparent)]
    Release(#[from] ReleaseError),
}

//! Testing utilities for code built on relinquish.
//!
//! Enabled with the `testing` feature.
//!
//! - [`generators`]: `proptest` strategies for the crate's value types and for
//!   sequences of collection operations
//! - [`fixtures`]: releasers that count how often their routine ran
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use relinquish::testing::prelude::*;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn names_are_trimmed(name in arb_resource_name()) {
//!         assert_eq!(name.as_ref(), name.trim());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

/// Import everything needed for testing with:
/// ```rust,ignore
/// use relinquish::testing::prelude::*;
/// ```
pub mod prelude {
    pub use super::fixtures::*;
    pub use super::generators::*;
}

//! # itemdb Testkit
//!
//! Test utilities for itemdb.
//!
//! This crate provides:
//! - Sample item types, including one that records its lifecycle hooks
//! - Temporary store fixtures and file helpers
//! - Property-based test generators using proptest
//!
//! The integration scenarios live under `tests/`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use itemdb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let store = TestStore::<User>::new("user");
//!     let id = store.add(User::new("A", 1)).unwrap();
//!     assert_eq!(store.get(&id).unwrap().name, "A");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod items;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::items::*;
}

pub use fixtures::*;
pub use generators::*;
pub use items::*;

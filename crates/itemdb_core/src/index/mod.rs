//! Uniqueness index.
//!
//! Items that declare unique keys (see [`Item::unique_keys`](crate::Item::unique_keys))
//! are registered here, one map per field from value to owning record id.
//! Items that declare none are exempt; uniqueness is opt-in per item type.
//!
//! The engine always calls [`UniqueIndex::check`] before touching the index
//! or the file, and only registers entries after the check passed within the
//! same critical section.

mod unique;

pub use unique::UniqueIndex;

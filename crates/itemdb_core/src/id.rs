//! Record identifier generation.
//!
//! The store never invents ids itself. The embedding application supplies an
//! [`IdGenerator`]; the store only checks that a generated id is not already
//! in use.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Produces new record identifiers.
pub trait IdGenerator: Send + Sync {
    /// Returns a new identifier. It should not repeat.
    fn new_id(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn new_id(&self) -> String {
        self()
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Monotonic counter ids, optionally prefixed (`user-1`, `user-2`, ...).
#[derive(Debug)]
pub struct SequenceGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceGenerator {
    /// Creates a generator starting at 1 with no prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at("", 1)
    }

    /// Creates a generator with a prefix and first value.
    pub fn starting_at(prefix: impl Into<String>, first: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequenceGenerator {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        if self.prefix.is_empty() {
            n.to_string()
        } else {
            format!("{}-{}", self.prefix, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_are_unique() {
        let generator = UuidGenerator;
        let ids: HashSet<String> = (0..100).map(|_| generator.new_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn sequence_counts_up() {
        let generator = SequenceGenerator::new();
        assert_eq!(generator.new_id(), "1");
        assert_eq!(generator.new_id(), "2");
    }

    #[test]
    fn sequence_with_prefix() {
        let generator = SequenceGenerator::starting_at("user", 10);
        assert_eq!(generator.new_id(), "user-10");
        assert_eq!(generator.new_id(), "user-11");
    }

    #[test]
    fn closure_generator() {
        let generator = || "fixed".to_string();
        assert_eq!(generator.new_id(), "fixed");
    }
}

//! The capability contract an item type implements to be stored.
//!
//! The store never looks inside an item. Everything it needs is expressed
//! through [`Item`]: validation, filtering, exact key matching, the optional
//! set of unique fields, and optional lifecycle hooks. Optional capabilities
//! are default methods, so a type opts in by overriding them.
//!
//! Items deliberately have no identity accessor. The store assigns and owns
//! ids; an item only describes its own value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Sparse field set used for key lookups and unique key declarations.
pub type KeyMap = BTreeMap<String, Value>;

/// Builds a [`KeyMap`] from `(field, value)` pairs.
///
/// ```
/// use itemdb_core::key_map;
/// use serde_json::json;
///
/// let key = key_map([("name", json!("alice")), ("rev", json!(3))]);
/// assert_eq!(key.len(), 2);
/// ```
pub fn key_map<'a, I>(pairs: I) -> KeyMap
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

/// Reason an item failed validation or did not match a filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ItemError {
    message: String,
}

impl ItemError {
    /// Creates a new item error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A value that can be held by an [`ItemStore`](crate::ItemStore).
///
/// # Example
///
/// ```
/// use itemdb_core::{Item, ItemError, KeyMap};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct User {
///     name: String,
/// }
///
/// impl Item for User {
///     fn validate(&self) -> Result<(), ItemError> {
///         if self.name.is_empty() {
///             return Err(ItemError::new("user.name not specified"));
///         }
///         Ok(())
///     }
///
///     fn matches(&self, filter: &Self) -> Result<(), ItemError> {
///         if !filter.name.is_empty() && filter.name != self.name {
///             return Err(ItemError::new("name differs"));
///         }
///         Ok(())
///     }
///
///     fn match_key(&self, key: &KeyMap) -> bool {
///         key.get("name").and_then(|v| v.as_str()) == Some(self.name.as_str())
///     }
/// }
/// ```
pub trait Item: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Checks the item on its own, independent of other records.
    fn validate(&self) -> Result<(), ItemError>;

    /// Partial comparison used when listing with a filter.
    ///
    /// Returns the first reason the item does not match.
    fn matches(&self, filter: &Self) -> Result<(), ItemError>;

    /// Exact comparison against the fields present in `key`.
    fn match_key(&self, key: &KeyMap) -> bool;

    /// Field values that must be unique across the store.
    ///
    /// `None` means the item takes part in no uniqueness checks.
    fn unique_keys(&self) -> Option<KeyMap> {
        None
    }

    /// Called after the item was durably added.
    fn notify_new(&self) {}

    /// Called on the new value after it durably replaced `previous`.
    fn notify_upd(&self, _previous: &Self) {}

    /// Called on the removed value after it was durably deleted.
    fn notify_del(&self) {}
}

//! Per-field value-to-id index enforcing uniqueness.

use crate::error::{StoreError, StoreResult};
use crate::item::{Item, KeyMap};
use serde_json::Value;
use std::collections::HashMap;

/// Canonical text used as the index key for a JSON value.
fn canonical(value: &Value) -> String {
    value.to_string()
}

/// Maps `(field, value)` pairs to the single record id owning them.
#[derive(Debug, Clone, Default)]
pub struct UniqueIndex {
    /// Store name, used in error messages.
    store: String,
    /// field -> canonical value -> id.
    fields: HashMap<String, HashMap<String, String>>,
}

impl UniqueIndex {
    /// Creates an empty index for the named store.
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            fields: HashMap::new(),
        }
    }

    /// Builds an index over a full dataset.
    ///
    /// Fails with `DuplicateKey` if two records declare the same value.
    pub fn rebuild<'a, T, I>(store: impl Into<String>, records: I) -> StoreResult<Self>
    where
        T: Item,
        I: IntoIterator<Item = (&'a str, &'a T)>,
    {
        let mut index = Self::new(store);
        for (id, item) in records {
            index.insert(id, item)?;
        }
        Ok(index)
    }

    /// Fails if any value `item` declares is owned by a record other than
    /// `exclude_id`.
    ///
    /// Pass `None` when adding (there is no self to exclude) and the record's
    /// own id when updating.
    pub fn check<T: Item>(&self, exclude_id: Option<&str>, item: &T) -> StoreResult<()> {
        match item.unique_keys() {
            Some(keys) => self.check_keys(exclude_id, &keys),
            None => Ok(()),
        }
    }

    fn check_keys(&self, exclude_id: Option<&str>, keys: &KeyMap) -> StoreResult<()> {
        for (field, value) in keys {
            let Some(values) = self.fields.get(field) else {
                continue;
            };
            let value = canonical(value);
            if let Some(owner) = values.get(&value) {
                if exclude_id != Some(owner.as_str()) {
                    return Err(StoreError::DuplicateKey {
                        store: self.store.clone(),
                        field: field.clone(),
                        value,
                        existing_id: owner.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Registers the values `item` declares under `id`.
    ///
    /// Nothing is registered if any value is owned by another record.
    pub fn insert<T: Item>(&mut self, id: &str, item: &T) -> StoreResult<()> {
        let Some(keys) = item.unique_keys() else {
            return Ok(());
        };
        self.check_keys(Some(id), &keys)?;
        for (field, value) in &keys {
            self.fields
                .entry(field.clone())
                .or_default()
                .insert(canonical(value), id.to_string());
            tracing::trace!(store = %self.store, field = %field, %value, id, "indexed");
        }
        Ok(())
    }

    /// Releases the values `item` declares, where they are owned by `id`.
    ///
    /// Fields or values that are not indexed are skipped.
    pub fn remove<T: Item>(&mut self, id: &str, item: &T) {
        let Some(keys) = item.unique_keys() else {
            return;
        };
        for (field, value) in &keys {
            let Some(values) = self.fields.get_mut(field) else {
                continue;
            };
            let value = canonical(value);
            if values.get(&value).map(String::as_str) == Some(id) {
                values.remove(&value);
                if values.is_empty() {
                    self.fields.remove(field);
                }
            }
        }
    }

    /// Returns the id owning `value` in `field`, if any.
    #[must_use]
    pub fn owner(&self, field: &str, value: &Value) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(|values| values.get(&canonical(value)))
            .map(String::as_str)
    }

    /// Returns the total number of indexed values across all fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.values().map(HashMap::len).sum()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

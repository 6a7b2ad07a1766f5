//! The item store engine.

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::id::IdGenerator;
use crate::item::{Item, KeyMap};
use crate::persist::{self, Dataset, StoredRecord, WriteOptions};
use crate::watch::ReloadWatcher;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// An `(id, item)` pair returned by lookups and listings.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    /// Id assigned by the store.
    pub id: String,
    /// The item value.
    pub item: T,
}

/// Counts of the notifications fired by a reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Ids present only in the new dataset.
    pub added: usize,
    /// Ids present in both datasets.
    pub updated: usize,
    /// Ids present only in the old dataset.
    pub deleted: usize,
}

/// Checks a store name against `^[a-zA-Z][a-zA-Z0-9_-]*[a-zA-Z0-9]$`.
fn validate_name(name: &str) -> StoreResult<()> {
    let bytes = name.as_bytes();
    let valid = match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if bytes.len() >= 2 => {
            first.is_ascii_alphabetic()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StoreError::invalid_input(format!(
            "store name \"{name}\" is not a valid identifier"
        )))
    }
}

/// State shared between the store handle and its reload watcher.
pub(crate) struct Inner<T: Item> {
    pub(crate) name: String,
    pub(crate) path: PathBuf,
    pub(crate) config: Config,
    id_gen: Box<dyn IdGenerator>,
    state: RwLock<Dataset<T>>,
}

impl<T: Item> Inner<T> {
    fn write_options(&self) -> WriteOptions {
        WriteOptions {
            pretty: self.config.pretty,
            sync: self.config.sync_writes,
        }
    }

    fn persist(&self, records: &[StoredRecord<T>]) -> StoreResult<()> {
        persist::write_records(&self.path, records, self.write_options())
    }

    fn validate(&self, item: &T) -> StoreResult<()> {
        item.validate()
            .map_err(|reason| StoreError::validation_failed(&self.name, reason.to_string()))
    }

    /// Loads `staging` as a full replacement dataset and makes it current.
    ///
    /// The validated bytes are written over the primary file first and the
    /// in-memory state is swapped right after, so file and memory always
    /// agree before any hook runs. Any failure before that point leaves the
    /// live store exactly as it was.
    pub(crate) fn reload_from(&self, staging: &Path) -> StoreResult<ReloadSummary> {
        let bytes = fs::read(staging)?;
        let dataset: Dataset<T> = persist::decode_dataset(staging, &self.name, &bytes)?;

        let mut state = self.state.write();
        persist::write_atomic(&self.path, &bytes, self.config.sync_writes)?;

        let updated: Vec<(StoredRecord<T>, Arc<T>)> = state
            .records
            .iter()
            .filter_map(|old| {
                dataset
                    .by_id
                    .get(&old.id)
                    .map(|new| (old.clone(), Arc::clone(new)))
            })
            .collect();
        let deleted: Vec<StoredRecord<T>> = state
            .records
            .iter()
            .filter(|old| !dataset.by_id.contains_key(&old.id))
            .cloned()
            .collect();
        let added: Vec<StoredRecord<T>> = dataset
            .records
            .iter()
            .filter(|new| !state.by_id.contains_key(&new.id))
            .cloned()
            .collect();
        let summary = ReloadSummary {
            added: added.len(),
            updated: updated.len(),
            deleted: deleted.len(),
        };

        *state = dataset;
        info!(
            store = %self.name,
            staging = %staging.display(),
            added = summary.added,
            updated = summary.updated,
            deleted = summary.deleted,
            "reloaded"
        );

        for (old, new) in &updated {
            trace!(store = %self.name, id = %old.id, "reload: notify_upd");
            new.notify_upd(&old.item);
        }
        for old in &deleted {
            trace!(store = %self.name, id = %old.id, "reload: notify_del");
            old.item.notify_del();
        }
        for new in &added {
            trace!(store = %self.name, id = %new.id, "reload: notify_new");
            new.item.notify_new();
        }
        Ok(summary)
    }
}

/// A file-backed collection of items of one type.
///
/// The whole dataset lives in memory and is mirrored to a single JSON file
/// that is rewritten atomically on every mutation. Each record gets an id
/// from the [`IdGenerator`] supplied at construction; items that declare
/// [unique keys](Item::unique_keys) are checked against every other record.
///
/// # Concurrency
///
/// State sits behind one `RwLock`. `add`, `upd`, `del` and reloads take the
/// write lock; `get`, `get_by` and `find` take the read lock, so scans never
/// observe a half-applied mutation. Lifecycle hooks run while the write lock
/// is held and must not call back into the same store.
///
/// # Example
///
/// ```rust,ignore
/// use itemdb_core::{ItemStore, UuidGenerator};
///
/// let users: ItemStore<User> = ItemStore::open("data/users.json", "user", UuidGenerator)?;
/// let id = users.add(User::new("alice"))?;
/// let alice = users.get(&id)?;
/// let first_ten = users.find(10, None);
/// ```
pub struct ItemStore<T: Item> {
    inner: Arc<Inner<T>>,
    watcher: Mutex<Option<ReloadWatcher>>,
}

impl<T: Item> ItemStore<T> {
    /// Opens (or creates) the store file at `path` with default configuration.
    pub fn open(
        path: impl AsRef<Path>,
        name: &str,
        id_gen: impl IdGenerator + 'static,
    ) -> StoreResult<Self> {
        Self::open_with_config(path, name, id_gen, Config::default())
    }

    /// Opens (or creates) the store file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `name` is not a valid identifier (`InvalidInput`)
    /// - the file holds an unacceptable dataset (`CorruptFile`)
    /// - the file cannot be read or created (`Io`)
    pub fn open_with_config(
        path: impl AsRef<Path>,
        name: &str,
        id_gen: impl IdGenerator + 'static,
        config: Config,
    ) -> StoreResult<Self> {
        validate_name(name)?;
        let path = path.as_ref().to_path_buf();
        let dataset = persist::load_dataset(&path, name, config.create_if_missing)?;
        debug!(
            store = name,
            path = %path.display(),
            records = dataset.len(),
            "opened JSON file store"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                path,
                config,
                id_gen: Box::new(id_gen),
                state: RwLock::new(dataset),
            }),
            watcher: Mutex::new(None),
        })
    }

    /// Opens the store and starts watching `staging` for replacement datasets.
    pub fn open_with_reload(
        path: impl AsRef<Path>,
        staging: impl AsRef<Path>,
        name: &str,
        id_gen: impl IdGenerator + 'static,
        config: Config,
    ) -> StoreResult<Self> {
        let store = Self::open_with_config(path, name, id_gen, config)?;
        store.watch(staging)?;
        Ok(store)
    }

    /// Starts the reload watcher on `staging`, replacing any previous one.
    pub fn watch(&self, staging: impl AsRef<Path>) -> StoreResult<()> {
        let watcher = ReloadWatcher::spawn(Arc::clone(&self.inner), staging.as_ref().to_path_buf())?;
        if let Some(mut previous) = self.watcher.lock().replace(watcher) {
            previous.stop();
        }
        Ok(())
    }

    /// Stops the reload watcher, if one is running, and waits for it to exit.
    pub fn stop_watching(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }

    /// Returns true if a reload watcher is running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Returns the staging file being watched, if any.
    #[must_use]
    pub fn staging_path(&self) -> Option<PathBuf> {
        self.watcher
            .lock()
            .as_ref()
            .map(|watcher| watcher.staging().to_path_buf())
    }

    /// Stops background work and closes the store.
    pub fn close(self) {
        self.stop_watching();
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().is_empty()
    }

    /// Returns all ids in file order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.inner
            .state
            .read()
            .records
            .iter()
            .map(|record| record.id.clone())
            .collect()
    }

    /// Returns true if a record with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner.state.read().by_id.contains_key(id)
    }

    /// Adds a new record and returns its id.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the item rejects itself
    /// - `DuplicateKey` if a declared unique value is already taken
    /// - `IdCollision` if the generator returned an id already in use
    /// - `Io` / `Serialization` if the file could not be rewritten
    pub fn add(&self, item: T) -> StoreResult<String> {
        let inner = &*self.inner;
        let mut state = inner.state.write();

        inner.validate(&item)?;
        state.index.check(None, &item)?;

        let id = inner.id_gen.new_id();
        if id.is_empty() {
            return Err(StoreError::invalid_input("id generator returned an empty id"));
        }
        if state.by_id.contains_key(&id) {
            return Err(StoreError::IdCollision {
                store: inner.name.clone(),
                id,
            });
        }

        let item = Arc::new(item);
        let mut index = state.index.clone();
        index.insert(&id, item.as_ref())?;
        let mut records = state.records.clone();
        records.push(StoredRecord {
            id: id.clone(),
            item: Arc::clone(&item),
        });
        inner.persist(&records)?;

        state.records = records;
        state.index = index;
        state.by_id.insert(id.clone(), Arc::clone(&item));
        debug!(store = %inner.name, id = %id, "ADD");

        item.notify_new();
        Ok(id)
    }

    /// Replaces the item stored under `id`.
    ///
    /// The record may keep its own unique values; it may not take values
    /// owned by a different record.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `id` is empty
    /// - `ValidationFailed` if the item rejects itself
    /// - `NotFound` if no record has `id`
    /// - `DuplicateKey` if a declared unique value belongs to another record
    /// - `Io` / `Serialization` if the file could not be rewritten
    pub fn upd(&self, id: &str, item: T) -> StoreResult<()> {
        if id.is_empty() {
            return Err(StoreError::invalid_input("cannot update a record with an empty id"));
        }
        let inner = &*self.inner;
        let mut state = inner.state.write();

        inner.validate(&item)?;
        let Some(pos) = state.records.iter().position(|record| record.id == id) else {
            return Err(StoreError::not_found(&inner.name, id));
        };
        state.index.check(Some(id), &item)?;

        let previous = Arc::clone(&state.records[pos].item);
        let item = Arc::new(item);
        let mut index = state.index.clone();
        index.remove(id, previous.as_ref());
        index.insert(id, item.as_ref())?;
        let mut records = state.records.clone();
        records[pos].item = Arc::clone(&item);
        inner.persist(&records)?;

        state.records = records;
        state.index = index;
        state.by_id.insert(id.to_string(), Arc::clone(&item));
        debug!(store = %inner.name, id, "UPD");

        item.notify_upd(&previous);
        Ok(())
    }

    /// Removes the record with `id`.
    ///
    /// Deleting an id that does not exist succeeds and changes nothing.
    pub fn del(&self, id: &str) -> StoreResult<()> {
        let inner = &*self.inner;
        let mut state = inner.state.write();

        let Some(pos) = state.records.iter().position(|record| record.id == id) else {
            trace!(store = %inner.name, id, "DEL of unknown id ignored");
            return Ok(());
        };

        let mut records = state.records.clone();
        let removed = records.remove(pos);
        inner.persist(&records)?;

        state.records = records;
        state.index.remove(id, removed.item.as_ref());
        state.by_id.remove(id);
        debug!(store = %inner.name, id, "DEL");

        removed.item.notify_del();
        Ok(())
    }

    /// Returns the item stored under `id`.
    pub fn get(&self, id: &str) -> StoreResult<T> {
        let state = self.inner.state.read();
        state
            .by_id
            .get(id)
            .map(|item| item.as_ref().clone())
            .ok_or_else(|| StoreError::not_found(&self.inner.name, id))
    }

    /// Returns the first record, in file order, whose item matches `key`.
    pub fn get_by(&self, key: &KeyMap) -> StoreResult<Record<T>> {
        let state = self.inner.state.read();
        state
            .records
            .iter()
            .find(|record| record.item.match_key(key))
            .map(|record| Record {
                id: record.id.clone(),
                item: record.item.as_ref().clone(),
            })
            .ok_or_else(|| StoreError::KeyNotFound {
                store: self.inner.name.clone(),
                key: serde_json::to_string(key).unwrap_or_else(|_| format!("{key:?}")),
            })
    }

    /// Lists records in file order.
    ///
    /// With a `filter`, only items whose [`Item::matches`] accepts it are
    /// returned. At most `limit` records are returned; `0` means no limit.
    #[must_use]
    pub fn find(&self, limit: usize, filter: Option<&T>) -> Vec<Record<T>> {
        let state = self.inner.state.read();
        let matching = state.records.iter().filter(|record| match filter {
            Some(filter) => record.item.matches(filter).is_ok(),
            None => true,
        });
        let take = if limit == 0 { usize::MAX } else { limit };
        let list: Vec<Record<T>> = matching
            .take(take)
            .map(|record| Record {
                id: record.id.clone(),
                item: record.item.as_ref().clone(),
            })
            .collect();
        trace!(store = %self.inner.name, limit, found = list.len(), "FIND");
        list
    }

    /// Loads `staging` as a full replacement dataset, promotes it to the
    /// store file and fires `notify_upd` / `notify_del` / `notify_new` for
    /// the difference against the current records.
    ///
    /// This is what the reload watcher does once a staging file settles; it
    /// can also be called directly. On error nothing changes.
    pub fn reload_from(&self, staging: impl AsRef<Path>) -> StoreResult<ReloadSummary> {
        self.inner.reload_from(staging.as_ref())
    }
}

impl<T: Item> Drop for ItemStore<T> {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

impl<T: Item> std::fmt::Debug for ItemStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemStore")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("records", &self.len())
            .field("watching", &self.is_watching())
            .finish()
    }
}

//! JSON file persistence.
//!
//! A store file holds the whole dataset as one JSON array:
//!
//! ```text
//! [
//!   { "_id": "<id>", "item": { ...item fields... } },
//!   ...
//! ]
//! ```
//!
//! Every mutation rewrites the entire file. Rewrites use the write-then-rename
//! pattern for crash safety:
//! 1. Write to `<file>.tmp`
//! 2. Sync the temporary file to disk
//! 3. Rename it over the store file
//! 4. Fsync the parent directory so the rename is durable
//!
//! Loading is all-or-nothing: an empty or duplicate id, malformed JSON, an
//! item that fails `validate()`, or two records declaring the same unique
//! value rejects the whole file with `CorruptFile`.

use crate::error::{StoreError, StoreResult};
use crate::index::UniqueIndex;
use crate::item::Item;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix of the temporary file used for atomic rewrites.
const TEMP_SUFFIX: &str = ".tmp";

/// On-disk shape of one record, borrowed for writing.
#[derive(Serialize)]
struct FileRecordRef<'a, T> {
    #[serde(rename = "_id")]
    id: &'a str,
    item: &'a T,
}

/// On-disk shape of one record, owned for reading.
///
/// Both fields are optional here so that a missing id or item is reported
/// as a corrupt file rather than a generic decode failure.
#[derive(Deserialize)]
struct FileRecord<T> {
    #[serde(rename = "_id", default)]
    id: String,
    item: Option<T>,
}

/// A record as held in memory: its id and a shared handle to the item.
#[derive(Debug)]
pub(crate) struct StoredRecord<T> {
    pub(crate) id: String,
    pub(crate) item: Arc<T>,
}

impl<T> Clone for StoredRecord<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            item: Arc::clone(&self.item),
        }
    }
}

/// A fully validated set of records.
///
/// Holds the ordered record sequence, the id map and the uniqueness index,
/// all consistent with each other.
#[derive(Debug)]
pub struct Dataset<T> {
    pub(crate) records: Vec<StoredRecord<T>>,
    pub(crate) by_id: HashMap<String, Arc<T>>,
    pub(crate) index: UniqueIndex,
}

impl<T: Item> Dataset<T> {
    /// Creates an empty dataset for the named store.
    pub fn empty(store: &str) -> Self {
        Self {
            records: Vec::new(),
            by_id: HashMap::new(),
            index: UniqueIndex::new(store),
        }
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the item with the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.by_id.get(id).map(Arc::as_ref)
    }

    /// Iterates `(id, item)` pairs in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.records
            .iter()
            .map(|record| (record.id.as_str(), record.item.as_ref()))
    }

    /// Returns the uniqueness index built over the records.
    #[must_use]
    pub fn index(&self) -> &UniqueIndex {
        &self.index
    }
}

/// Options controlling how the store file is written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteOptions {
    /// Pretty-print with two-space indentation.
    pub(crate) pretty: bool,
    /// Sync the file to disk before renaming it into place.
    pub(crate) sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            sync: true,
        }
    }
}

/// Loads a store file.
///
/// A missing file is created empty when `create_if_missing` is set. An empty
/// (or whitespace-only) file and a file holding `null` are empty datasets.
pub fn load_dataset<T: Item>(
    path: &Path,
    store: &str,
    create_if_missing: bool,
) -> StoreResult<Dataset<T>> {
    match fs::read(path) {
        Ok(bytes) => decode_dataset(path, store, &bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound && create_if_missing => {
            create_parent_dirs(path)?;
            File::create(path)?;
            tracing::debug!(store, path = %path.display(), "created empty store file");
            Ok(Dataset::empty(store))
        }
        Err(e) => Err(e.into()),
    }
}

/// Decodes and validates file content read from `path`.
pub fn decode_dataset<T: Item>(path: &Path, store: &str, bytes: &[u8]) -> StoreResult<Dataset<T>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Dataset::empty(store));
    }

    // a literal `null` decodes as no records
    let entries: Option<Vec<FileRecord<T>>> = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::corrupt_file(path, format!("malformed JSON: {e}")))?;
    let entries = entries.unwrap_or_default();

    let mut dataset = Dataset::empty(store);
    for (i, entry) in entries.into_iter().enumerate() {
        let id = entry.id;
        if id.is_empty() {
            return Err(StoreError::corrupt_file(
                path,
                format!("{store}[{i}] has no id"),
            ));
        }
        if dataset.by_id.contains_key(&id) {
            return Err(StoreError::corrupt_file(
                path,
                format!("{store}[{i}] duplicate id \"{id}\""),
            ));
        }
        let Some(item) = entry.item else {
            return Err(StoreError::corrupt_file(
                path,
                format!("{store}[{i}].id={id} has no item data"),
            ));
        };
        if let Err(reason) = item.validate() {
            return Err(StoreError::corrupt_file(
                path,
                format!("{store}[{i}].id={id} is invalid: {reason}"),
            ));
        }
        if let Err(e) = dataset.index.insert(&id, &item) {
            return Err(StoreError::corrupt_file(
                path,
                format!("{store}[{i}].id={id} has duplicate key: {e}"),
            ));
        }

        let item = Arc::new(item);
        dataset.by_id.insert(id.clone(), Arc::clone(&item));
        dataset.records.push(StoredRecord { id, item });
    }

    tracing::debug!(store, path = %path.display(), records = dataset.len(), "loaded dataset");
    Ok(dataset)
}

/// Encodes records in file order.
pub(crate) fn encode_records<T: Item>(
    records: &[StoredRecord<T>],
    pretty: bool,
) -> StoreResult<Vec<u8>> {
    let shaped: Vec<FileRecordRef<'_, T>> = records
        .iter()
        .map(|record| FileRecordRef {
            id: &record.id,
            item: record.item.as_ref(),
        })
        .collect();
    let bytes = if pretty {
        serde_json::to_vec_pretty(&shaped)?
    } else {
        serde_json::to_vec(&shaped)?
    };
    Ok(bytes)
}

/// Rewrites the whole store file with `records`.
pub(crate) fn write_records<T: Item>(
    path: &Path,
    records: &[StoredRecord<T>],
    options: WriteOptions,
) -> StoreResult<()> {
    let bytes = encode_records(records, options.pretty)?;
    write_atomic(path, &bytes, options.sync)?;
    Ok(())
}

/// Replaces `path` with `bytes` via a temporary sibling file and a rename.
///
/// Readers of `path` see either the old content or the new content, never a
/// partial write.
pub fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
    let temp_path = temp_path(path);

    if let Err(e) = write_temp(&temp_path, bytes, sync) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if sync {
        sync_parent_dir(path)?;
    }
    Ok(())
}

fn write_temp(temp_path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

/// Returns `<path>.tmp`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn create_parent_dirs(path: &Path) -> io::Result<()> {
    fs::create_dir_all(parent_dir(path))
}

/// Syncs the directory holding `path` so a rename into it is durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(parent_dir(path))?;
    dir.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    // NTFS journals metadata; directory handles cannot be fsynced
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{key_map, ItemError, KeyMap};
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        rev: i64,
    }

    impl Item for User {
        fn validate(&self) -> Result<(), ItemError> {
            if self.name.is_empty() {
                return Err(ItemError::new("user.name not specified"));
            }
            Ok(())
        }

        fn matches(&self, _filter: &Self) -> Result<(), ItemError> {
            Ok(())
        }

        fn match_key(&self, _key: &KeyMap) -> bool {
            false
        }

        fn unique_keys(&self) -> Option<KeyMap> {
            Some(key_map([("name", json!(self.name))]))
        }
    }

    fn record(id: &str, name: &str, rev: i64) -> StoredRecord<User> {
        StoredRecord {
            id: id.into(),
            item: Arc::new(User {
                name: name.into(),
                rev,
            }),
        }
    }

    fn load(path: &Path) -> StoreResult<Dataset<User>> {
        load_dataset(path, "user", false)
    }

    fn corrupt_reason(result: StoreResult<Dataset<User>>) -> String {
        match result {
            Err(StoreError::CorruptFile { reason, .. }) => reason,
            Err(other) => panic!("expected CorruptFile, got {other}"),
            Ok(_) => panic!("expected CorruptFile, got a dataset"),
        }
    }

    #[test]
    fn missing_file_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("users.json");

        let dataset: Dataset<User> = load_dataset(&path, "user", true).unwrap();
        assert!(dataset.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempdir().unwrap();
        let result = load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn empty_file_is_empty_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"  \n").unwrap();

        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn null_is_empty_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "null\n").unwrap();

        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn write_then_load_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let records = vec![record("b", "B", 1), record("a", "A", 2)];

        write_records(&path, &records, WriteOptions::default()).unwrap();
        let dataset = load(&path).unwrap();

        let ids: Vec<&str> = dataset.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(dataset.get("a").unwrap().rev, 2);
        assert_eq!(dataset.index().owner("name", &json!("B")), Some("b"));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn file_shape() {
        let records = vec![record("1", "A", 1)];
        let bytes = encode_records(&records, false).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"[{"_id":"1","item":{"name":"A","rev":1}}]"#
        );

        let pretty = String::from_utf8(encode_records(&records, true).unwrap()).unwrap();
        assert!(pretty.starts_with("[\n  {\n    \"_id\": \"1\""));
    }

    #[test]
    fn duplicate_id_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            r#"[{"_id":"1","item":{"name":"A","rev":1}},{"_id":"1","item":{"name":"B","rev":1}}]"#,
        )
        .unwrap();

        assert!(corrupt_reason(load(&path)).contains("duplicate id \"1\""));
    }

    #[test]
    fn missing_id_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, r#"[{"item":{"name":"A","rev":1}}]"#).unwrap();

        assert!(corrupt_reason(load(&path)).contains("has no id"));

        fs::write(&path, r#"[{"_id":"","item":{"name":"A","rev":1}}]"#).unwrap();
        assert!(corrupt_reason(load(&path)).contains("has no id"));
    }

    #[test]
    fn missing_item_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, r#"[{"_id":"1"}]"#).unwrap();

        assert!(corrupt_reason(load(&path)).contains("has no item data"));
    }

    #[test]
    fn invalid_item_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, r#"[{"_id":"1","item":{"name":"","rev":2}}]"#).unwrap();

        assert!(corrupt_reason(load(&path)).contains("user.name not specified"));
    }

    #[test]
    fn duplicate_unique_value_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            r#"[{"_id":"1","item":{"name":"A","rev":1}},{"_id":"2","item":{"name":"A","rev":1}}]"#,
        )
        .unwrap();

        assert!(corrupt_reason(load(&path)).contains("duplicate key"));
    }

    #[test]
    fn malformed_json_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "[{").unwrap();

        assert!(corrupt_reason(load(&path)).contains("malformed JSON"));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, b"old").unwrap();

        write_atomic(&path, b"new", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/data/users.json")),
            PathBuf::from("/data/users.json.tmp")
        );
    }
}

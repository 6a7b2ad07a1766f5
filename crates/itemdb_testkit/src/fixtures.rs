//! Test fixtures and store helpers.
//!
//! Provides temporary stores, file helpers, and a reload configuration with
//! timings short enough for tests.

use itemdb_core::{Config, Item, ItemStore, UuidGenerator};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// File name of the primary store file inside a [`TestStore`] directory.
pub const STORE_FILE: &str = "store.json";

/// File name of the staging file inside a [`TestStore`] directory.
pub const STAGING_FILE: &str = "load/store.json";

/// A store in a temporary directory, removed on drop.
pub struct TestStore<T: Item> {
    /// The store instance.
    pub store: ItemStore<T>,
    // declared after `store` so the watcher stops before the directory goes
    dir: TempDir,
}

impl<T: Item> TestStore<T> {
    /// Opens a new empty store with default configuration and no fsync.
    pub fn new(name: &str) -> Self {
        Self::with_config(name, Config::default().sync_writes(false))
    }

    /// Opens a new empty store with `config`.
    pub fn with_config(name: &str, config: Config) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = ItemStore::open_with_config(dir.path().join(STORE_FILE), name, UuidGenerator, config)
            .expect("Failed to open test store");
        Self { store, dir }
    }

    /// Opens a store watching the staging file, using [`fast_reload_config`].
    pub fn with_reload(name: &str) -> Self {
        let test = Self::with_config(name, fast_reload_config());
        test.store
            .watch(test.staging_path())
            .expect("Failed to start reload watcher");
        test
    }

    /// Closes the store and opens the same file again.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        let name = store.name().to_string();
        let config = store.config().clone();
        store.close();
        let store = ItemStore::open_with_config(dir.path().join(STORE_FILE), &name, UuidGenerator, config)
            .expect("Failed to reopen test store");
        Self { store, dir }
    }

    /// The temporary directory.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// The primary store file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.path().join(STORE_FILE)
    }

    /// The staging file watched by [`TestStore::with_reload`].
    pub fn staging_path(&self) -> PathBuf {
        self.dir.path().join(STAGING_FILE)
    }

    /// The error marker next to the staging file.
    pub fn marker_path(&self) -> PathBuf {
        self.staging_path()
            .with_extension(&self.store.config().error_marker_extension)
    }

    /// Reads the primary store file.
    pub fn file_contents(&self) -> Vec<u8> {
        fs::read(self.file_path()).expect("Failed to read store file")
    }
}

impl<T: Item> std::ops::Deref for TestStore<T> {
    type Target = ItemStore<T>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A configuration with millisecond reload timings and no fsync.
pub fn fast_reload_config() -> Config {
    Config::default()
        .sync_writes(false)
        .poll_interval(Duration::from_millis(10))
        .quiescence(Duration::from_millis(80))
}

/// Writes `contents` to `path`, creating parent directories.
pub fn write_file(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(path, contents).expect("Failed to write file");
}

/// Returns true if both files exist and hold the same bytes.
pub fn same_file_contents(a: impl AsRef<Path>, b: impl AsRef<Path>) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout` passes.
///
/// Returns whether the condition held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Installs a test-writer tracing subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

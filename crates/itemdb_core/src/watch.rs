//! Background reload of a staging file.
//!
//! An external publisher writes a complete replacement dataset to a staging
//! file next to the store. A watcher thread polls the file's modification
//! stamp and, once it has stopped changing for the quiescence window, loads
//! it as the store's new dataset:
//!
//! ```text
//!   IDLE ──stamp changed──▶ CHANGING ──quiet for window──▶ RELOADING ──▶ IDLE
//!                            │   ▲
//!                            └───┘ stamp changed again (window restarts)
//! ```
//!
//! A failed reload never touches the live store. Its reason is written to an
//! error marker (the staging path with its extension replaced) which is
//! removed again by the next successful reload.

use crate::error::{StoreError, StoreResult};
use crate::item::Item;
use crate::store::Inner;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Identifies one version of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    /// Reads the stamp of `path`, or `None` if it cannot be stat'ed.
    pub(crate) fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

/// Debounce state of the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Nothing has changed since the last reload.
    Idle,
    /// The file changed; waiting for it to settle.
    Changing {
        /// When the most recent change was observed.
        since: Instant,
    },
}

/// The polling state machine, kept free of I/O so it can be driven directly.
#[derive(Debug)]
pub(crate) struct WatchState {
    last: Option<FileStamp>,
    phase: Phase,
    quiescence: Duration,
}

impl WatchState {
    /// Starts idle with `baseline` as the known stamp.
    pub(crate) fn new(baseline: Option<FileStamp>, quiescence: Duration) -> Self {
        Self {
            last: baseline,
            phase: Phase::Idle,
            quiescence,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    /// Feeds one poll observation. Returns true when a reload is due.
    ///
    /// A missing file is not a change.
    pub(crate) fn observe(&mut self, current: Option<FileStamp>, now: Instant) -> bool {
        if current.is_some() && current != self.last {
            self.last = current;
            self.phase = Phase::Changing { since: now };
            return false;
        }
        match self.phase {
            Phase::Changing { since } if now.saturating_duration_since(since) >= self.quiescence => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }
}

/// Returns the error marker path for a staging file.
pub(crate) fn marker_path(staging: &Path, extension: &str) -> PathBuf {
    staging.with_extension(extension)
}

/// Handle to a running watcher thread.
///
/// Dropping the handle stops the thread and waits for it.
#[derive(Debug)]
pub(crate) struct ReloadWatcher {
    staging: PathBuf,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ReloadWatcher {
    /// Spawns a watcher thread reloading `staging` into `inner`.
    ///
    /// Fails with `InvalidInput` if the error marker path would be the
    /// staging file itself.
    pub(crate) fn spawn<T: Item>(inner: Arc<Inner<T>>, staging: PathBuf) -> StoreResult<Self> {
        let marker = marker_path(&staging, &inner.config.error_marker_extension);
        if marker == staging {
            return Err(StoreError::invalid_input(format!(
                "error marker for {} would overwrite the staging file",
                staging.display()
            )));
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let poll_interval = inner.config.poll_interval;
        let mut state = WatchState::new(FileStamp::of(&staging), inner.config.quiescence);
        let thread_staging = staging.clone();

        let handle = thread::Builder::new()
            .name(format!("itemdb-reload-{}", inner.name))
            .spawn(move || {
                debug!(store = %inner.name, staging = %thread_staging.display(), "watching");
                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if state.observe(FileStamp::of(&thread_staging), Instant::now()) {
                        process_staging(&inner, &thread_staging, &marker);
                    } else if matches!(state.phase(), Phase::Changing { .. }) {
                        trace!(store = %inner.name, "staging file changing");
                    }
                }
                debug!(store = %inner.name, staging = %thread_staging.display(), "watcher stopped");
            })?;

        Ok(Self {
            staging,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Returns the staging file being watched.
    pub(crate) fn staging(&self) -> &Path {
        &self.staging
    }

    /// Signals the thread to stop and waits for it to exit.
    pub(crate) fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(staging = %self.staging.display(), "reload watcher panicked");
            }
        }
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The RELOADING step: reload, then write or clear the error marker.
///
/// A panicking item hook is contained here so the watcher keeps running.
/// The reload it interrupted has already been committed.
fn process_staging<T: Item>(inner: &Inner<T>, staging: &Path, marker: &Path) {
    info!(store = %inner.name, staging = %staging.display(), "processing staging file");
    let result = match panic::catch_unwind(AssertUnwindSafe(|| inner.reload_from(staging))) {
        Ok(result) => result,
        Err(_) => {
            warn!(store = %inner.name, staging = %staging.display(), "item hook panicked during reload");
            return;
        }
    };
    match result {
        Ok(_) => match fs::remove_file(marker) {
            Ok(()) => debug!(marker = %marker.display(), "removed error marker"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(marker = %marker.display(), error = %e, "failed to remove error marker"),
        },
        Err(err) => {
            warn!(store = %inner.name, staging = %staging.display(), error = %err, "reload failed");
            match fs::write(marker, format!("reload failed: {err}")) {
                Ok(()) => debug!(marker = %marker.display(), "wrote error marker"),
                Err(e) => warn!(marker = %marker.display(), error = %e, "failed to write error marker"),
            }
        }
    }
}

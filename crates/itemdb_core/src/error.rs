//! Error types for itemdb core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in item store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A caller supplied an unusable argument (empty id, bad store name).
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// The item rejected itself in `validate()`.
    #[error("{store}: validation failed: {reason}")]
    ValidationFailed {
        /// Store name.
        store: String,
        /// Reason reported by the item.
        reason: String,
    },

    /// A declared unique field value is already owned by another record.
    #[error("{store}: duplicate key {field}={value} (owned by id {existing_id})")]
    DuplicateKey {
        /// Store name.
        store: String,
        /// Field that collided.
        field: String,
        /// Canonical JSON rendering of the colliding value.
        value: String,
        /// Record that currently owns the value.
        existing_id: String,
    },

    /// No record with the given id exists.
    #[error("{store}: id={id} does not exist")]
    NotFound {
        /// Store name.
        store: String,
        /// The missing id.
        id: String,
    },

    /// No record matched a key lookup.
    #[error("{store}: no record matches {key}")]
    KeyNotFound {
        /// Store name.
        store: String,
        /// JSON rendering of the lookup key.
        key: String,
    },

    /// The id generator produced an id that is already in use.
    #[error("{store}: generated id={id} already exists")]
    IdCollision {
        /// Store name.
        store: String,
        /// The colliding id.
        id: String,
    },

    /// A data file could not be accepted as a dataset.
    #[error("corrupt file {}: {reason}", path.display())]
    CorruptFile {
        /// File that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// I/O error at the file system boundary.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding the dataset to JSON failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation_failed(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(store: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            store: store.into(),
            id: id.into(),
        }
    }

    /// Creates a corrupt file error.
    pub fn corrupt_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error reports a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::KeyNotFound { .. })
    }

    /// Returns true if this error reports a uniqueness violation.
    #[must_use]
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}

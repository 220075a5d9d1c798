//! Error types for the storage layer.

use thiserror::Error;

/// Errors raised by a [`Backend`](super::Backend) implementation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The redb database failed a read, write or commit.
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    /// The database file or its directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The backend refused the operation (unavailable, injected fault, ...).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by [`Store`](super::Store) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persistent backend failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A persisted record could not be decoded.
    #[error("corrupt record for key '{key}': {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be encoded for storage.
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    /// The store name is empty, too long or contains unsupported characters.
    #[error("invalid store name '{0}'")]
    InvalidName(String),

    /// Opening another store would exceed the registry's limit.
    #[error("store limit of {0} reached")]
    TooManyStores(usize),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

//! Store error types.

use thiserror::Error;

/// Errors that can occur during store and persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation needs an active conversation and there is none.
    #[error("no active conversation")]
    NoActiveConversation,

    /// SQLite error (open, schema, query).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialized state could not be encoded or decoded.
    #[error("serde json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mutex poisoned")]
    MutexPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

//! Error types for session operations.

use chat_store::StoreError;
use chat_stream::StreamError;
use thiserror::Error;

/// Errors that can occur while driving a chat session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No active conversation after the user message was added.
    #[error("no thread id for the active conversation")]
    MissingThread,

    /// A thread panicked while holding the session lock.
    #[error("session lock poisoned")]
    LockPoisoned,

    /// Stream client could not be created.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
}

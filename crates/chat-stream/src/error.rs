//! Error types for chat-stream.

use thiserror::Error;

/// Errors that end a chat stream or a request to the chat API.
///
/// Malformed individual event lines are not errors: the decoder logs and
/// skips them.
#[derive(Debug, Error)]
pub enum StreamError {
    /// HTTP request failed (connection refused, DNS, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    /// The response body failed while it was being read.
    #[error("stream interrupted: {0}")]
    Body(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

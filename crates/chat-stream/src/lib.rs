//! Streaming client for the chat API.
//!
//! This crate talks to a chat endpoint that answers a `POST /chat` with an
//! event stream of `data:` lines. It supports:
//!
//! - Opening a stream and receiving decoded [`StreamEvent`](chat_core::StreamEvent)s
//!   through a [`StreamHandler`]
//! - Tolerating arbitrary chunk boundaries, including split UTF-8 characters
//! - Silent, idempotent cancellation through [`StreamHandle`]
//! - Health checking of the API
//!
//! # Example
//!
//! ```no_run
//! use chat_core::{ChatRequest, StreamEvent};
//! use chat_stream::{ChatClient, ClientConfig, StreamError, StreamHandler};
//!
//! struct Printer;
//!
//! impl StreamHandler for Printer {
//!     fn on_event(&mut self, event: StreamEvent) {
//!         if let Some(text) = event.assistant_text() {
//!             print!("{}", text);
//!         }
//!     }
//!
//!     fn on_error(&mut self, error: StreamError) {
//!         eprintln!("Error: {}", error);
//!     }
//!
//!     fn on_complete(&mut self) {
//!         println!();
//!     }
//! }
//!
//! # async fn example() -> Result<(), StreamError> {
//! let client = ChatClient::new(ClientConfig::default())?;
//! let handle = client.open(ChatRequest::new("thread-1", "Hello!"), Printer);
//!
//! // Stop early if the reply is no longer wanted.
//! handle.cancel();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod stream;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use decoder::{Decoded, EventDecoder};
pub use error::StreamError;
pub use stream::{StreamHandle, StreamHandler};

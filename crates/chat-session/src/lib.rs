//! Send-message orchestration for a streaming chat client.
//!
//! [`ChatSession`] ties a [`chat_stream::ChatClient`] to a
//! [`chat_store::ConversationStore`]:
//!
//! ```text
//! send_message(text)
//!      ↓
//! add user message + empty assistant placeholder
//!      ↓
//! POST {api_url}/chat ──► event stream
//!                              ↓
//!        AIMessage delta → append to placeholder
//!        action / tokens → merge into placeholder metadata
//!        complete        → streaming = false
//!        error           → "[Error: ...]" annotation, streaming = false
//! ```
//!
//! Deltas always land in the conversation that was active when the message
//! was sent. A cancelled or superseded stream can no longer touch the store.
//!
//! # Example
//!
//! ```rust,no_run
//! use chat_session::{ChatSession, SendOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ChatSession::from_env()?;
//!     let mut updates = session.subscribe()?;
//!
//!     if let SendOutcome::Started { conversation_id, .. } = session.send_message("Hi")? {
//!         updates.wait_for(|s| !s.streaming).await?;
//!         let snapshot = session.snapshot()?;
//!         let conversation = &snapshot.conversations[&conversation_id];
//!         println!("{}", conversation.last_message().map(|m| m.content.as_str()).unwrap_or(""));
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod session;

pub use config::{SessionConfig, SessionConfigBuilder, DEFAULT_DB_PATH};
pub use error::SessionError;
pub use session::{ChatSession, SendOutcome};

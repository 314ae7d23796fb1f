//! Conversation state with durable persistence.
//!
//! [`ConversationStore`] owns every conversation plus the transient session
//! flags (streaming, current action, sidebar). Mutations are synchronous and
//! publish a new [`StoreSnapshot`] through a `tokio::sync::watch` channel.
//! After [`ConversationStore::initialize`] each commit is written through a
//! [`Persistence`] adapter to a [`KeyValueStore`].
//!
//! # Example
//!
//! ```
//! use chat_store::ConversationStore;
//!
//! let mut store = ConversationStore::in_memory();
//! store.initialize();
//!
//! store.add_user_message("Hi");
//! store.add_assistant_message().unwrap();
//! store.append_to_last_message("Hello");
//!
//! let current = store.current_conversation().unwrap();
//! assert_eq!(current.title, "Hi");
//! assert_eq!(current.last_message().unwrap().content, "Hello");
//! ```

pub mod error;
pub mod kv;
pub mod persistence;
pub mod store;

pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
pub use persistence::{Persistence, ACTIVE_CONVERSATION_KEY, CONVERSATIONS_KEY};
pub use store::{ConversationCollection, ConversationStore, StoreSnapshot};

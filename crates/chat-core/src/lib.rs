//! Core types shared by the chat session manager crates.
//!
//! This crate defines:
//!
//! - [`Message`] / [`Conversation`] - The conversation model kept by the store
//! - [`MessagePatch`] - Partial metadata updates applied to a streamed message
//! - [`StreamEvent`] / [`ChatRequest`] - Wire types of the chat endpoint
//! - [`ActionStatus`] / [`TokenUsage`] - Shared between the wire and the model
//!
//! # Example
//!
//! ```rust
//! use chat_core::{Conversation, Message};
//!
//! let conversation = Conversation::from_first_message("What is the capital of France?");
//! assert_eq!(conversation.title, "What is the capital of France?");
//!
//! let conversation = conversation.with_message(Message::user("What is the capital of France?"));
//! assert_eq!(conversation.messages.len(), 1);
//! ```

mod conversation;
mod event;

pub use conversation::{
    generate_id, generate_title, now, Conversation, Message, MessagePatch, Role,
    DEFAULT_CONVERSATION_TITLE, TITLE_MAX_WORDS,
};
pub use event::{ActionStatus, ChatRequest, EventType, StreamEvent, TokenUsage, DONE_SENTINEL};

//! Conversation model.
//!
//! Conversations are treated as values: every mutation helper returns a new
//! [`Conversation`] and leaves the original untouched, so a conversation that
//! has already been published to observers is never changed in place.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{ActionStatus, TokenUsage};

/// Title used until a conversation receives its first user message.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Number of words of the first user message kept in a title.
pub const TITLE_MAX_WORDS: usize = 6;

/// Current instant, truncated to the millisecond precision used on disk.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Generate a unique, opaque identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Derive a conversation title from the first user message.
///
/// Keeps the first [`TITLE_MAX_WORDS`] whitespace-separated words and appends
/// `...` when the message was longer. Blank input yields the default title.
pub fn generate_title(first_message: &str) -> String {
    let words: Vec<&str> = first_message.split_whitespace().collect();
    if words.is_empty() {
        return DEFAULT_CONVERSATION_TITLE.to_string();
    }

    let mut title = words[..words.len().min(TITLE_MAX_WORDS)].join(" ");
    if words.len() > TITLE_MAX_WORDS {
        title.push_str("...");
    }
    title
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Text of the turn. Grows by appending while an assistant reply streams.
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    /// Last server phase seen for this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            timestamp: now(),
            token_usage: None,
            cached: None,
            action: None,
            tool_name: None,
        }
    }

    /// Create a user message stamped with the current instant.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message stamped with the current instant.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Merge metadata from `patch`. Content is never touched.
    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(action) = patch.action {
            self.action = Some(action);
        }
        if let Some(tool_name) = &patch.tool_name {
            self.tool_name = tool_name.clone();
        }
        if let Some(usage) = patch.token_usage {
            self.token_usage = Some(usage);
        }
        if let Some(cached) = patch.cached {
            self.cached = Some(cached);
        }
    }
}

/// Partial metadata update for the last message of a conversation.
///
/// `None` fields are left as they are. `tool_name: Some(None)` clears the
/// tool name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub action: Option<ActionStatus>,
    pub tool_name: Option<Option<String>>,
    pub token_usage: Option<TokenUsage>,
    pub cached: Option<bool>,
}

impl MessagePatch {
    /// Patch recording a server phase and the tool it concerns.
    pub fn action(action: ActionStatus, tool_name: Option<String>) -> Self {
        Self {
            action: Some(action),
            tool_name: Some(tool_name),
            ..Self::default()
        }
    }

    /// Patch recording token accounting and the cache-hit flag.
    pub fn usage(token_usage: TokenUsage, cached: Option<bool>) -> Self {
        Self {
            token_usage: Some(token_usage),
            cached,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// Messages in insertion (chronological) order.
    pub messages: Vec<Message>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Create an empty conversation with the default title.
    pub fn new() -> Self {
        Self::with_title(DEFAULT_CONVERSATION_TITLE)
    }

    /// Create an empty conversation titled after its first user message.
    pub fn from_first_message(first_message: &str) -> Self {
        Self::with_title(generate_title(first_message))
    }

    fn with_title(title: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: generate_id(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether this is an untouched conversation created by "new thread".
    pub fn is_blank(&self) -> bool {
        self.messages.is_empty() && self.title == DEFAULT_CONVERSATION_TITLE
    }

    /// Return a copy with `message` appended.
    pub fn with_message(&self, message: Message) -> Self {
        let mut next = self.clone();
        next.messages.push(message);
        next.touch();
        next
    }

    /// Return a copy retitled from `first_message`.
    pub fn retitled(&self, first_message: &str) -> Self {
        let mut next = self.clone();
        next.title = generate_title(first_message);
        next.touch();
        next
    }

    /// Return a copy with `fragment` appended to the last message.
    ///
    /// Returns `None` when the last message is missing or is not an
    /// assistant message.
    pub fn with_appended_to_last(&self, fragment: &str) -> Option<Self> {
        if !self.last_message()?.is_assistant() {
            return None;
        }

        let mut next = self.clone();
        if let Some(last) = next.messages.last_mut() {
            last.content.push_str(fragment);
        }
        next.touch();
        Some(next)
    }

    /// Return a copy with `patch` merged into the last message.
    ///
    /// Returns `None` when the conversation has no messages.
    pub fn with_last_patched(&self, patch: &MessagePatch) -> Option<Self> {
        self.last_message()?;

        let mut next = self.clone();
        if let Some(last) = next.messages.last_mut() {
            last.apply(patch);
        }
        next.touch();
        Some(next)
    }

    /// Bump `updated_at` without ever moving it backwards.
    fn touch(&mut self) {
        self.updated_at = self.updated_at.max(now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_title_short_message() {
        assert_eq!(generate_title("Hi"), "Hi");
        assert_eq!(generate_title("  Tell   me\tabout Rust  "), "Tell me about Rust");
    }

    #[test]
    fn test_title_exactly_six_words() {
        assert_eq!(generate_title("one two three four five six"), "one two three four five six");
    }

    #[test]
    fn test_title_truncated() {
        assert_eq!(
            generate_title("one two three four five six seven"),
            "one two three four five six..."
        );
    }

    #[test]
    fn test_title_blank_message() {
        assert_eq!(generate_title(""), DEFAULT_CONVERSATION_TITLE);
        assert_eq!(generate_title("   \n "), DEFAULT_CONVERSATION_TITLE);
    }

    #[test]
    fn test_new_conversation() {
        let conversation = Conversation::new();
        assert_eq!(conversation.title, DEFAULT_CONVERSATION_TITLE);
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.created_at, conversation.updated_at);
        assert!(conversation.is_blank());
    }

    #[test]
    fn test_with_message_leaves_original_untouched() {
        let original = Conversation::from_first_message("Hi");
        let next = original.with_message(Message::user("Hi"));

        assert!(original.messages.is_empty());
        assert_eq!(next.messages.len(), 1);
        assert_eq!(next.id, original.id);
        assert!(next.updated_at >= original.updated_at);
    }

    #[test]
    fn test_append_only_to_assistant() {
        let conversation = Conversation::new().with_message(Message::user("Hi"));
        assert!(conversation.with_appended_to_last("x").is_none());

        let conversation = conversation.with_message(Message::assistant(""));
        let next = conversation
            .with_appended_to_last("Hel")
            .and_then(|c| c.with_appended_to_last("lo"))
            .unwrap();
        assert_eq!(next.last_message().unwrap().content, "Hello");
        assert_eq!(conversation.last_message().unwrap().content, "");
    }

    #[test]
    fn test_append_to_empty_conversation() {
        assert!(Conversation::new().with_appended_to_last("x").is_none());
        assert!(Conversation::new()
            .with_last_patched(&MessagePatch::action(ActionStatus::Generating, None))
            .is_none());
    }

    #[test]
    fn test_patch_merges_metadata_only() {
        let conversation = Conversation::new()
            .with_message(Message::user("Hi"))
            .with_message(Message::assistant("partial"));

        let usage = TokenUsage {
            input_tokens: Some(3),
            output_tokens: Some(5),
            total_tokens: Some(8),
        };
        let next = conversation
            .with_last_patched(&MessagePatch::action(
                ActionStatus::CallingTool,
                Some("search".to_string()),
            ))
            .and_then(|c| c.with_last_patched(&MessagePatch::usage(usage, Some(true))))
            .unwrap();

        let last = next.last_message().unwrap();
        assert_eq!(last.content, "partial");
        assert_eq!(last.action, Some(ActionStatus::CallingTool));
        assert_eq!(last.tool_name.as_deref(), Some("search"));
        assert_eq!(last.token_usage, Some(usage));
        assert_eq!(last.cached, Some(true));

        let cleared = next
            .with_last_patched(&MessagePatch::action(ActionStatus::Generating, None))
            .unwrap();
        assert_eq!(cleared.last_message().unwrap().tool_name, None);
        assert_eq!(cleared.last_message().unwrap().token_usage, Some(usage));
    }

    #[test]
    fn test_updated_at_never_decreases() {
        let mut conversation = Conversation::new();
        let future = now() + Duration::hours(1);
        conversation.updated_at = future;

        let next = conversation.with_message(Message::user("later"));
        assert_eq!(next.updated_at, future);
    }

    #[test]
    fn test_serde_round_trip_is_exact() {
        let conversation = Conversation::from_first_message("Hi")
            .with_message(Message::user("Hi"))
            .with_message(Message::assistant("Hello"))
            .with_last_patched(&MessagePatch::action(ActionStatus::Complete, None))
            .unwrap();

        let json = serde_json::to_string(&conversation).unwrap();
        let decoded: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, conversation);
    }

    #[test]
    fn test_message_wire_shape() {
        let message = Message::user("Hi");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "Hi");
        assert!(value["timestamp"].is_i64());
        assert!(value.get("token_usage").is_none());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(MessagePatch::default().is_empty());
        assert!(!MessagePatch::usage(TokenUsage::default(), None).is_empty());
    }
}

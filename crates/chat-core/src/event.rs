//! Wire types for the streaming chat endpoint.

use serde::{Deserialize, Serialize};

/// Payload of a `data:` line that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Phase the server reports for the in-flight assistant message.
///
/// `Complete` and `Error` are terminal for the message they are attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    ReceivedPrompt,
    CallingTool,
    Generating,
    Processing,
    Complete,
    Error,
    #[default]
    None,
}

impl ActionStatus {
    /// Whether this phase ends the message's streaming lifetime.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Wire name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReceivedPrompt => "received_prompt",
            Self::CallingTool => "calling_tool",
            Self::Generating => "generating",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting reported by the server. Any field may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// Discriminator of a [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    HumanMessage,
    #[serde(rename = "AIMessage")]
    AiMessage,
    ToolMessage,
    SystemMessage,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "error")]
    Error,
}

/// One self-contained event carried by a `data:` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Thread the server attributes this event to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(rename = "type")]
    pub kind: EventType,

    /// Text payload. For `AIMessage` this is an assistant delta, for `error`
    /// the error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenUsage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cached: Option<bool>,

    /// Current server phase. A JSON `null` reads as absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl StreamEvent {
    /// Create a bare event of the given type.
    pub fn new(kind: EventType) -> Self {
        Self {
            thread_id: None,
            kind,
            content: None,
            tokens: None,
            is_cached: None,
            action: None,
            tool_name: None,
        }
    }

    /// Create an assistant text delta.
    pub fn ai_message(content: impl Into<String>) -> Self {
        Self::new(EventType::AiMessage).with_content(content)
    }

    /// Create a completion marker.
    pub fn complete() -> Self {
        Self::new(EventType::Complete)
    }

    /// Create an error marker carrying a description.
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(EventType::Error).with_content(content)
    }

    /// Set the text payload.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the reported phase and optional tool name.
    pub fn with_action(mut self, action: ActionStatus, tool_name: Option<&str>) -> Self {
        self.action = Some(action);
        self.tool_name = tool_name.map(str::to_string);
        self
    }

    /// Set token accounting and the cache-hit flag.
    pub fn with_tokens(mut self, tokens: TokenUsage, is_cached: Option<bool>) -> Self {
        self.tokens = Some(tokens);
        self.is_cached = is_cached;
        self
    }

    /// Decode one event from the payload of a `data:` line.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Assistant text carried by this event, if any.
    pub fn assistant_text(&self) -> Option<&str> {
        match self.kind {
            EventType::AiMessage => self.content.as_deref().filter(|c| !c.is_empty()),
            _ => None,
        }
    }
}

/// Body of the outgoing `POST /chat` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub prompt: String,
}

impl ChatRequest {
    pub fn new(thread_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            prompt: prompt.into(),
        }
    }
}

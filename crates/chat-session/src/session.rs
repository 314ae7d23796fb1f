//! Chat session: sends user messages and applies streamed replies.

use std::sync::{Arc, Mutex, MutexGuard};

use chat_core::{ActionStatus, ChatRequest, EventType, MessagePatch, StreamEvent};
use chat_store::{ConversationStore, StoreSnapshot};
use chat_stream::{ChatClient, StreamError, StreamHandle, StreamHandler};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Annotation used when an error event carries no message.
const UNKNOWN_ERROR: &str = "Unknown error";

/// Result of [`ChatSession::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The text was blank.
    Ignored,
    /// A reply is already streaming; the text was discarded.
    Dropped,
    /// A stream was opened for the conversation.
    Started {
        conversation_id: String,
        stream_id: u64,
    },
}

/// The stream currently allowed to mutate the store.
struct ActiveStream {
    id: u64,
    conversation_id: String,
    handle: StreamHandle,
}

/// Everything guarded by the session lock.
struct SessionState {
    store: ConversationStore,
    active: Option<ActiveStream>,
    next_stream_id: u64,
}

impl SessionState {
    fn is_current(&self, stream_id: u64) -> bool {
        self.active.as_ref().is_some_and(|s| s.id == stream_id)
    }

    /// Settle the active stream with a terminal action.
    fn settle(&mut self, action: ActionStatus) {
        self.store.set_current_action(action);
        self.store.set_streaming(false);
        self.active = None;
    }
}

fn lock(shared: &Mutex<SessionState>) -> Result<MutexGuard<'_, SessionState>, SessionError> {
    shared.lock().map_err(|_| SessionError::LockPoisoned)
}

/// Drives one user's conversations against the chat API.
///
/// At most one reply streams at a time. Streamed deltas are routed to the
/// conversation that was active when the message was sent, so switching,
/// creating or deleting conversations mid-stream is safe.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<Mutex<SessionState>>,
    client: ChatClient,
}

impl ChatSession {
    /// Create a session over an existing store and client.
    ///
    /// The store is used as is; call [`ConversationStore::initialize`] first
    /// if durable state should be loaded.
    pub fn new(store: ConversationStore, client: ChatClient) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SessionState {
                store,
                active: None,
                next_stream_id: 0,
            })),
            client,
        }
    }

    /// Open the configured database, load it, and connect the client.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let mut store = ConversationStore::open(&config.db_path)?;
        store.initialize();

        let client = ChatClient::new(config.client_config())?;
        info!(
            "Chat session ready (api: {}, db: {})",
            config.api_url,
            config.db_path.display()
        );

        Ok(Self::new(store, client))
    }

    /// Create a session from environment variables.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_config(&SessionConfig::from_env())
    }

    /// Send `text` as a user message and start streaming the reply.
    ///
    /// Must be called from within a tokio runtime.
    pub fn send_message(&self, text: &str) -> Result<SendOutcome, SessionError> {
        if text.trim().is_empty() {
            debug!("Ignoring blank message");
            return Ok(SendOutcome::Ignored);
        }

        let mut state = lock(&self.shared)?;
        if state.store.is_streaming() {
            warn!("Dropping message: a reply is already streaming");
            return Ok(SendOutcome::Dropped);
        }

        state.store.add_user_message(text);
        state.store.add_assistant_message()?;

        let conversation_id = state
            .store
            .active_conversation_id()
            .map(str::to_string)
            .ok_or(SessionError::MissingThread)?;

        state.store.set_streaming(true);
        state.store.set_current_action(ActionStatus::ReceivedPrompt);

        state.next_stream_id += 1;
        let stream_id = state.next_stream_id;

        let handler = SessionHandler {
            shared: Arc::clone(&self.shared),
            stream_id,
            conversation_id: conversation_id.clone(),
        };
        // Callbacks need the lock, so none can run before the slot is set.
        let handle = self
            .client
            .open(ChatRequest::new(conversation_id.clone(), text), handler);

        state.active = Some(ActiveStream {
            id: stream_id,
            conversation_id: conversation_id.clone(),
            handle,
        });

        info!(stream_id, conversation_id = %conversation_id, "Started reply stream");
        Ok(SendOutcome::Started {
            conversation_id,
            stream_id,
        })
    }

    /// Cancel the streaming reply, keeping whatever was already received.
    ///
    /// Returns false when nothing was streaming.
    pub fn cancel(&self) -> Result<bool, SessionError> {
        let active = {
            let mut state = lock(&self.shared)?;
            let Some(active) = state.active.take() else {
                return Ok(false);
            };
            state.store.set_streaming(false);
            state.store.set_current_action(ActionStatus::None);
            active
        };

        // Outside the session lock: a running callback holds the stream's
        // dispatch gate while it waits for that lock.
        active.handle.cancel();

        info!(
            stream_id = active.id,
            conversation_id = %active.conversation_id,
            "Cancelled reply stream"
        );
        Ok(true)
    }

    /// Id of the stream allowed to mutate the store, if any.
    pub fn active_stream_id(&self) -> Result<Option<u64>, SessionError> {
        Ok(lock(&self.shared)?.active.as_ref().map(|s| s.id))
    }

    pub fn new_conversation(&self) -> Result<String, SessionError> {
        Ok(lock(&self.shared)?.store.new_conversation())
    }

    pub fn switch_conversation(&self, id: &str) -> Result<bool, SessionError> {
        Ok(lock(&self.shared)?.store.switch_conversation(id))
    }

    pub fn delete_conversation(&self, id: &str) -> Result<bool, SessionError> {
        Ok(lock(&self.shared)?.store.delete_conversation(id))
    }

    pub fn clear_history(&self) -> Result<(), SessionError> {
        lock(&self.shared)?.store.clear_history();
        Ok(())
    }

    pub fn toggle_sidebar(&self) -> Result<(), SessionError> {
        lock(&self.shared)?.store.toggle_sidebar();
        Ok(())
    }

    /// Receive a snapshot after every store change.
    pub fn subscribe(&self) -> Result<watch::Receiver<StoreSnapshot>, SessionError> {
        Ok(lock(&self.shared)?.store.subscribe())
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, SessionError> {
        Ok(lock(&self.shared)?.store.snapshot())
    }

    /// Probe the chat API. Any failure reads as unavailable.
    pub async fn is_available(&self) -> bool {
        match self.client.health_check().await {
            Ok(ok) => ok,
            Err(e) => {
                debug!("Chat API unavailable: {}", e);
                false
            }
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// Applies one stream's callbacks to the store.
struct SessionHandler {
    shared: Arc<Mutex<SessionState>>,
    stream_id: u64,
    conversation_id: String,
}

impl SessionHandler {
    /// Lock the session, but only while this stream is still current.
    fn current(&self) -> Option<MutexGuard<'_, SessionState>> {
        let state = match lock(&self.shared) {
            Ok(state) => state,
            Err(e) => {
                error!("Dropping stream callback: {}", e);
                return None;
            }
        };

        if state.is_current(self.stream_id) {
            Some(state)
        } else {
            debug!(stream_id = self.stream_id, "Ignoring callback from stale stream");
            None
        }
    }
}

impl StreamHandler for SessionHandler {
    fn on_event(&mut self, event: StreamEvent) {
        let Some(mut state) = self.current() else {
            return;
        };
        let id = self.conversation_id.as_str();

        if let Some(text) = event.assistant_text() {
            state.store.append_to_last_message_in(id, text);
        }

        if let Some(action) = event.action {
            state.store.set_current_action(action);
            state.store.update_last_message_metadata_in(
                id,
                &MessagePatch::action(action, event.tool_name.clone()),
            );
        }

        if let Some(tokens) = event.tokens {
            state
                .store
                .update_last_message_metadata_in(id, &MessagePatch::usage(tokens, event.is_cached));
        }

        match event.kind {
            EventType::Complete => {
                debug!(stream_id = self.stream_id, "Reply complete");
                state.settle(ActionStatus::Complete);
            }
            EventType::Error => {
                let reason = event
                    .content
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .unwrap_or(UNKNOWN_ERROR);
                warn!(stream_id = self.stream_id, "Server reported error: {}", reason);

                state
                    .store
                    .append_to_last_message_in(id, &format!("\n\n[Error: {}]", reason));
                state.settle(ActionStatus::Error);
            }
            _ => {}
        }
    }

    fn on_error(&mut self, err: StreamError) {
        let Some(mut state) = self.current() else {
            return;
        };

        state
            .store
            .append_to_last_message_in(&self.conversation_id, &format!("\n\n[Error: {}]", err));
        state.settle(ActionStatus::Error);
    }

    fn on_complete(&mut self) {
        if let Some(mut state) = self.current() {
            state.settle(ActionStatus::Complete);
        }
    }
}

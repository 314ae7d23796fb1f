//! Reactive conversation store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chat_core::{ActionStatus, Conversation, Message, MessagePatch};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::kv::{MemoryKeyValueStore, SqliteKeyValueStore};
use crate::persistence::Persistence;

/// All known conversations keyed by id.
pub type ConversationCollection = HashMap<String, Arc<Conversation>>;

/// Immutable view of the store at one version.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub conversations: Arc<ConversationCollection>,
    /// Weak reference into `conversations`. May dangle; use
    /// [`StoreSnapshot::current_conversation`] to dereference it.
    pub active_conversation_id: Option<String>,
    pub streaming: bool,
    pub current_action: ActionStatus,
    pub sidebar_open: bool,
    /// Incremented on every commit.
    pub version: u64,
}

impl StoreSnapshot {
    /// The active conversation, if the active id names a member.
    pub fn current_conversation(&self) -> Option<&Arc<Conversation>> {
        self.active_conversation_id
            .as_deref()
            .and_then(|id| self.conversations.get(id))
    }

    /// Conversations ordered by most recent activity first.
    pub fn sorted_conversations(&self) -> Vec<Arc<Conversation>> {
        let mut sorted: Vec<_> = self.conversations.values().cloned().collect();
        sorted.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        sorted
    }
}

/// Single source of truth for conversations and session flags.
///
/// Every mutation builds a new [`StoreSnapshot`] and publishes it to
/// subscribers. Once [`initialize`](Self::initialize) has run, commits that
/// change the collection or the active id are written through to
/// [`Persistence`].
pub struct ConversationStore {
    state: StoreSnapshot,
    persistence: Persistence,
    initialized: bool,
    tx: watch::Sender<StoreSnapshot>,
}

impl ConversationStore {
    pub fn new(persistence: Persistence) -> Self {
        let state = StoreSnapshot::default();
        let (tx, _rx) = watch::channel(state.clone());

        Self {
            state,
            persistence,
            initialized: false,
            tx,
        }
    }

    /// Create a store backed by the SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let kv = SqliteKeyValueStore::open(path)?;
        Ok(Self::new(Persistence::new(kv)))
    }

    /// Create a store whose durable state lives only in memory.
    pub fn in_memory() -> Self {
        Self::new(Persistence::new(MemoryKeyValueStore::new()))
    }

    /// Load durable state and enable write-through.
    ///
    /// A stored active id that names no loaded conversation is dropped.
    /// Calling this again is a no-op.
    pub fn initialize(&mut self) {
        if self.initialized {
            debug!("Store already initialized");
            return;
        }

        let conversations = self.persistence.load();
        let stored_active = self.persistence.load_active_id();
        let active = stored_active
            .as_ref()
            .filter(|id| conversations.contains_key(id.as_str()))
            .cloned();

        if stored_active.is_some() && active.is_none() {
            debug!("Dropping dangling active conversation id");
            self.persistence.save_active_id(None);
        }

        info!(
            conversations = conversations.len(),
            active = active.as_deref().unwrap_or("none"),
            "Conversation store initialized"
        );

        let mut next = self.state.clone();
        next.conversations = Arc::new(conversations);
        next.active_conversation_id = active;
        self.publish(next);
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Receive every future snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.tx.subscribe()
    }

    // ---- Views ----

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn conversations(&self) -> Arc<ConversationCollection> {
        Arc::clone(&self.state.conversations)
    }

    /// Active conversation id, only if it names a member of the collection.
    pub fn active_conversation_id(&self) -> Option<&str> {
        self.state.current_conversation().map(|c| c.id.as_str())
    }

    pub fn current_conversation(&self) -> Option<Arc<Conversation>> {
        self.state.current_conversation().cloned()
    }

    pub fn sorted_conversations(&self) -> Vec<Arc<Conversation>> {
        self.state.sorted_conversations()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Conversation>> {
        self.state.conversations.get(id).cloned()
    }

    pub fn is_streaming(&self) -> bool {
        self.state.streaming
    }

    pub fn current_action(&self) -> ActionStatus {
        self.state.current_action
    }

    pub fn is_sidebar_open(&self) -> bool {
        self.state.sidebar_open
    }

    // ---- Thread operations ----

    /// Create an empty conversation and make it active.
    pub fn new_conversation(&mut self) -> String {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        info!("New conversation {}", id);

        let mut next = self.with_conversation(conversation);
        next.active_conversation_id = Some(id.clone());
        next.sidebar_open = false;
        self.commit(next);

        id
    }

    /// Make `id` active. Returns false (and changes nothing) if unknown.
    pub fn switch_conversation(&mut self, id: &str) -> bool {
        if !self.state.conversations.contains_key(id) {
            debug!("Ignoring switch to unknown conversation {}", id);
            return false;
        }

        let mut next = self.state.clone();
        next.active_conversation_id = Some(id.to_string());
        next.sidebar_open = false;
        self.commit(next);
        true
    }

    /// Remove `id`. If it was active, the most recently updated remaining
    /// conversation becomes active.
    pub fn delete_conversation(&mut self, id: &str) -> bool {
        if !self.state.conversations.contains_key(id) {
            return false;
        }

        let mut conversations = (*self.state.conversations).clone();
        conversations.remove(id);

        let mut next = self.state.clone();
        if next.active_conversation_id.as_deref() == Some(id) {
            next.active_conversation_id = conversations
                .values()
                .max_by(|a, b| {
                    a.updated_at
                        .cmp(&b.updated_at)
                        .then_with(|| a.created_at.cmp(&b.created_at))
                })
                .map(|c| c.id.clone());
        }
        next.conversations = Arc::new(conversations);

        info!(
            "Deleted conversation {} (active: {})",
            id,
            next.active_conversation_id.as_deref().unwrap_or("none")
        );
        self.commit(next);
        true
    }

    /// Erase every conversation, in memory and on disk.
    pub fn clear_history(&mut self) {
        self.persistence.clear();

        let mut next = self.state.clone();
        next.conversations = Arc::new(ConversationCollection::new());
        next.active_conversation_id = None;

        info!("Cleared conversation history");
        self.publish(next);
    }

    // ---- Message operations ----

    /// Append a user message to the active conversation, creating one
    /// titled from `text` if there is none.
    pub fn add_user_message(&mut self, text: &str) -> Message {
        let message = Message::user(text);

        let updated = match self.state.current_conversation() {
            Some(c) if c.is_blank() => c.retitled(text).with_message(message.clone()),
            Some(c) => c.with_message(message.clone()),
            None => Conversation::from_first_message(text).with_message(message.clone()),
        };
        let id = updated.id.clone();

        let mut next = self.with_conversation(updated);
        next.active_conversation_id = Some(id);
        self.commit(next);

        message
    }

    /// Append an empty assistant message to the active conversation.
    pub fn add_assistant_message(&mut self) -> Result<Message> {
        let conversation = self
            .state
            .current_conversation()
            .ok_or(StoreError::NoActiveConversation)?;

        let message = Message::assistant("");
        let next = self.with_conversation(conversation.with_message(message.clone()));
        self.commit(next);

        Ok(message)
    }

    /// Append `fragment` to the last message of the active conversation.
    pub fn append_to_last_message(&mut self, fragment: &str) -> bool {
        match self.active_conversation_id().map(str::to_string) {
            Some(id) => self.append_to_last_message_in(&id, fragment),
            None => false,
        }
    }

    /// Append `fragment` to the last message of conversation `id`.
    ///
    /// No-op unless that message exists and is an assistant message.
    pub fn append_to_last_message_in(&mut self, id: &str, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }

        let Some(updated) = self
            .state
            .conversations
            .get(id)
            .and_then(|c| c.with_appended_to_last(fragment))
        else {
            return false;
        };

        let next = self.with_conversation(updated);
        self.commit(next);
        true
    }

    /// Merge `patch` into the last message of the active conversation.
    pub fn update_last_message_metadata(&mut self, patch: &MessagePatch) -> bool {
        match self.active_conversation_id().map(str::to_string) {
            Some(id) => self.update_last_message_metadata_in(&id, patch),
            None => false,
        }
    }

    /// Merge `patch` into the last message of conversation `id`.
    pub fn update_last_message_metadata_in(&mut self, id: &str, patch: &MessagePatch) -> bool {
        if patch.is_empty() {
            return false;
        }

        let Some(updated) = self
            .state
            .conversations
            .get(id)
            .and_then(|c| c.with_last_patched(patch))
        else {
            return false;
        };

        let next = self.with_conversation(updated);
        self.commit(next);
        true
    }

    // ---- Session flags ----

    pub fn set_streaming(&mut self, streaming: bool) {
        if self.state.streaming != streaming {
            let mut next = self.state.clone();
            next.streaming = streaming;
            self.commit(next);
        }
    }

    pub fn set_current_action(&mut self, action: ActionStatus) {
        if self.state.current_action != action {
            let mut next = self.state.clone();
            next.current_action = action;
            self.commit(next);
        }
    }

    pub fn set_sidebar_open(&mut self, open: bool) {
        if self.state.sidebar_open != open {
            let mut next = self.state.clone();
            next.sidebar_open = open;
            self.commit(next);
        }
    }

    pub fn toggle_sidebar(&mut self) {
        self.set_sidebar_open(!self.state.sidebar_open);
    }

    // ---- Commit ----

    /// Next state with `conversation` inserted (or replaced) by id.
    fn with_conversation(&self, conversation: Conversation) -> StoreSnapshot {
        let mut conversations = (*self.state.conversations).clone();
        conversations.insert(conversation.id.clone(), Arc::new(conversation));

        let mut next = self.state.clone();
        next.conversations = Arc::new(conversations);
        next
    }

    fn commit(&mut self, next: StoreSnapshot) {
        if self.initialized {
            if !Arc::ptr_eq(&next.conversations, &self.state.conversations) {
                self.persistence.save(&next.conversations);
            }
            if next.active_conversation_id != self.state.active_conversation_id {
                self.persistence
                    .save_active_id(next.active_conversation_id.as_deref());
            }
        }

        self.publish(next);
    }

    fn publish(&mut self, mut next: StoreSnapshot) {
        next.version = self.state.version + 1;
        debug!(version = next.version, "Store commit");

        self.state = next;
        self.tx.send_replace(self.state.clone());
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("version", &self.state.version)
            .field("conversations", &self.state.conversations.len())
            .field("initialized", &self.initialized)
            .finish()
    }
}

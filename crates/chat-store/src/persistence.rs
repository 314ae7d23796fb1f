//! Mapping between the in-memory conversation collection and durable storage.
//!
//! Durability is best-effort: failures are logged and never propagated, so a
//! broken disk cannot take down an active session.

use std::collections::HashMap;
use std::sync::Arc;

use chat_core::Conversation;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::kv::KeyValueStore;
use crate::store::ConversationCollection;

/// Entry holding the serialized collection (a JSON object keyed by id).
pub const CONVERSATIONS_KEY: &str = "chat_conversations";

/// Entry holding the active conversation id as a plain string.
pub const ACTIVE_CONVERSATION_KEY: &str = "chat_current_conversation_id";

/// Persistence adapter over a [`KeyValueStore`].
pub struct Persistence {
    kv: Box<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(kv: impl KeyValueStore + 'static) -> Self {
        Self { kv: Box::new(kv) }
    }

    /// Load the stored collection.
    ///
    /// Returns an empty collection when nothing is stored or the stored
    /// value cannot be decoded.
    pub fn load(&self) -> ConversationCollection {
        match self.try_load() {
            Ok(conversations) => conversations,
            Err(e) => {
                error!("Failed to load conversations: {}", e);
                ConversationCollection::new()
            }
        }
    }

    fn try_load(&self) -> Result<ConversationCollection> {
        let Some(raw) = self.kv.get(CONVERSATIONS_KEY)? else {
            return Ok(ConversationCollection::new());
        };

        let stored: HashMap<String, Conversation> = serde_json::from_str(&raw)?;
        debug!(count = stored.len(), "Loaded conversations");

        Ok(stored
            .into_iter()
            .map(|(id, conversation)| (id, Arc::new(conversation)))
            .collect())
    }

    /// Store the collection, replacing what was there.
    pub fn save(&self, conversations: &ConversationCollection) {
        let result = serde_json::to_string(conversations)
            .map_err(Into::into)
            .and_then(|json| self.kv.set(CONVERSATIONS_KEY, &json));

        match result {
            Ok(()) => debug!(count = conversations.len(), "Saved conversations"),
            Err(e) => error!("Failed to save conversations: {}", e),
        }
    }

    /// Load the stored active conversation id.
    pub fn load_active_id(&self) -> Option<String> {
        match self.kv.get(ACTIVE_CONVERSATION_KEY) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                warn!("Failed to load active conversation id: {}", e);
                None
            }
        }
    }

    /// Store the active conversation id. `None` removes the entry.
    pub fn save_active_id(&self, id: Option<&str>) {
        let result = match id {
            Some(id) => self.kv.set(ACTIVE_CONVERSATION_KEY, id),
            None => self.kv.remove(ACTIVE_CONVERSATION_KEY),
        };

        if let Err(e) = result {
            error!("Failed to save active conversation id: {}", e);
        }
    }

    /// Erase both entries.
    pub fn clear(&self) {
        for key in [CONVERSATIONS_KEY, ACTIVE_CONVERSATION_KEY] {
            if let Err(e) = self.kv.remove(key) {
                error!("Failed to clear {}: {}", key, e);
            }
        }
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

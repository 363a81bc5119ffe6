//! In-memory conversation store.
//!
//! Callers are expected to hold the user's exclusive lock across a
//! get/modify/save sequence; the store itself only guards its map.

use async_trait::async_trait;
use clarion_core::{Conversation, ConversationStore, MemoryError, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Conversation>, MemoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&user_id.0).cloned())
    }

    async fn save(&self, conversation: Conversation) -> Result<(), MemoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.user_id.0.clone(), conversation);
        Ok(())
    }
}

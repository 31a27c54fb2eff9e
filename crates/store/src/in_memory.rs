//! In-memory backend, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use copycat_core::error::StoreError;
use copycat_core::message::{ConversationId, Message};
use copycat_core::store::{ChatRecord, ConversationStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Chats kept in a map behind an async lock. Lost on restart.
#[derive(Clone)]
pub struct InMemoryConversationStore {
    chats: Arc<RwLock<HashMap<ConversationId, ChatRecord>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            chats: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of chats held.
    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chats.read().await.is_empty()
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

    async fn create(&self, title: &str) -> Result<ChatRecord, StoreError> {
        let chat = ChatRecord::new(title);
        debug!(chat_id = %chat.id, "Created chat");
        self.chats
            .write()
            .await
            .insert(chat.id.clone(), chat.clone());
        Ok(chat)
    }

    async fn load(&self, id: &ConversationId) -> Result<ChatRecord, StoreError> {
        self.chats
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn append(&self, id: &ConversationId, message: Message) -> Result<(), StoreError> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        chat.push(message);
        Ok(())
    }
}

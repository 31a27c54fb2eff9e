//! ConversationStore trait: the opaque persistence boundary.
//!
//! The agent core never owns persistence. A caller loads a [`ChatRecord`],
//! hands its messages to the agent, and appends what comes back.

use crate::error::StoreError;
use crate::message::{ConversationId, Message, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: ConversationId,
    pub title: String,
    /// Only `user` and `assistant` messages are kept here.
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: title.into(),
            messages: Vec::new(),
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, bumping `updated_at` and tracking the last
    /// assistant reply.
    pub fn push(&mut self, message: Message) {
        if message.role == Role::Assistant {
            self.last_message = Some(message.content.clone());
        }
        self.updated_at = Utc::now();
        self.messages.push(message);
    }
}

/// Storage for chat records.
///
/// Implementations must tolerate concurrent appends to different chats.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name (for logs).
    fn name(&self) -> &str;

    /// Create an empty chat.
    async fn create(&self, title: &str) -> Result<ChatRecord, StoreError>;

    /// Load a snapshot of a chat.
    async fn load(&self, id: &ConversationId) -> Result<ChatRecord, StoreError>;

    /// Append a message to a chat.
    async fn append(&self, id: &ConversationId, message: Message) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tracks_last_assistant_message() {
        let mut chat = ChatRecord::new("demo");
        chat.push(Message::user("clone example.com"));
        assert!(chat.last_message.is_none());
        chat.push(Message::assistant("done"));
        assert_eq!(chat.last_message.as_deref(), Some("done"));
        assert_eq!(chat.messages.len(), 2);
    }
}

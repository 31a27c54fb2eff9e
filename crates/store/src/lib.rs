//! Conversation store backends.
//!
//! The agent never touches these directly; the chat service and the gateway
//! load and append through the [`ConversationStore`](copycat_core::ConversationStore)
//! trait.

pub mod in_memory;

pub use in_memory::InMemoryConversationStore;

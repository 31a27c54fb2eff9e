//! # CopyCat Core
//!
//! Domain types, traits, and error definitions for the CopyCat agent.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`]: the chat-completions backend (`copycat-providers`)
//! - [`Tool`]: side-effecting capabilities (`copycat-tools`)
//! - [`ConversationStore`]: chat persistence (`copycat-store`)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{
    CloneError, Error, ProviderError, Result, StepParseError, StoreError, ToolError,
};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{ChatRecord, ConversationStore};
pub use tool::{Dispatch, Tool, ToolContext, ToolOutput, ToolRegistry};

//! Error types for the CopyCat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] rolls them up.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all CopyCat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Conversation store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Site cloning errors ---
    #[error("Clone error: {0}")]
    Clone(#[from] CloneError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool input: {0}")]
    InvalidInput(String),

    #[error("Tool cancelled: {0}")]
    Cancelled(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum CloneError {
    /// The target page could not be loaded at all. This is the only
    /// failure that aborts a clone.
    #[error("Failed to load page {url}: {reason}")]
    PageLoad { url: String, reason: String },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Failed to download {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Filesystem error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),

    #[error("Clone cancelled")]
    Cancelled,
}

/// A model reply that is not a valid protocol step.
///
/// Never fatal: the agent loop drops the reply and asks again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepParseError {
    #[error("reply is not JSON: {0}")]
    NotJson(String),

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("reply has no \"step\" field")]
    MissingStep,

    #[error("TOOL step has no \"tool_name\"")]
    MissingToolName,

    #[error("field \"{0}\" must be a string")]
    InvalidField(&'static str),
}

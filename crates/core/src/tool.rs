//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world: look up
//! the weather, query GitHub, run a command, clone a website. The model asks
//! for a tool by name with a single text input; the registry resolves the
//! name and turns every outcome (including panics) into data the loop can
//! feed back as an observation.

use crate::error::ToolError;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-invocation context handed to every tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Cancelled when the owning agent run is aborted.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

/// The output of a successful tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Human-readable output
    pub text: String,

    /// Optional structured data (preferred over `text` in observations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutput {
    /// A plain-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    /// A structured result with a textual summary.
    pub fn structured(text: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            data: Some(data),
        }
    }

    /// The value carried in the OBSERVE step's `content` field.
    pub fn observation(&self) -> serde_json::Value {
        self.data
            .clone()
            .unwrap_or_else(|| serde_json::Value::String(self.text.clone()))
    }
}

/// The core Tool trait.
///
/// Each capability implements this trait and is registered in the
/// [`ToolRegistry`] under its `name()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool as the model refers to it.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// The declared input contract, e.g. `"url: string"`.
    fn input_description(&self) -> &str;

    /// Invoke the tool with the raw text input from the TOOL step.
    async fn invoke(&self, input: &str, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;

    /// One-line signature used in the system prompt.
    fn signature(&self) -> String {
        format!(
            "{}({}): {}",
            self.name(),
            self.input_description(),
            self.description()
        )
    }
}

/// The outcome of routing one TOOL step through the registry.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// The tool ran and produced output.
    Completed(ToolOutput),
    /// The tool ran and failed; the string is a human-readable description.
    Failed(String),
    /// No tool is registered under the requested name.
    UnknownTool(String),
}

impl Dispatch {
    pub fn is_success(&self) -> bool {
        matches!(self, Dispatch::Completed(_))
    }

    /// The value carried in the OBSERVE step's `content` field.
    pub fn observation(&self) -> serde_json::Value {
        match self {
            Dispatch::Completed(output) => output.observation(),
            Dispatch::Failed(message) => serde_json::Value::String(message.clone()),
            Dispatch::UnknownTool(name) => {
                serde_json::Value::String(format!("Tool {name} not found"))
            }
        }
    }
}

/// A fixed registry of available tools.
///
/// Built once at startup and shared behind an `Arc`; the agent loop only
/// reads from it. Keys are sorted so the prompt listing is stable.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Prompt lines, one per tool.
    pub fn signatures(&self) -> Vec<String> {
        self.tools.values().map(|t| t.signature()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Route a call to the named tool.
    ///
    /// Never fails: unknown names yield [`Dispatch::UnknownTool`], tool
    /// errors and panics yield [`Dispatch::Failed`].
    pub async fn dispatch(&self, name: &str, input: &str, ctx: &ToolContext) -> Dispatch {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = %name, "Requested tool is not registered");
            return Dispatch::UnknownTool(name.to_string());
        };

        debug!(tool = %name, input_len = input.len(), "Dispatching tool");

        match AssertUnwindSafe(tool.invoke(input, ctx)).catch_unwind().await {
            Ok(Ok(output)) => Dispatch::Completed(output),
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                Dispatch::Failed(format!("Error: {e}"))
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(tool = %name, reason = %reason, "Tool panicked");
                Dispatch::Failed(format!("Error: tool {name} crashed: {reason}"))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

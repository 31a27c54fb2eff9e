//! The START/THINK/TOOL/OBSERVE/OUTPUT step protocol.
//!
//! The model replies with one JSON object per turn:
//!
//! ```json
//! { "step": "TOOL", "content": "cloning", "tool_name": "webCloner", "input": "https://example.com" }
//! ```
//!
//! Parsing is strict: the reply must be exactly one JSON object (surrounding
//! whitespace aside). Anything else is a [`StepParseError`].

use copycat_core::error::StepParseError;
use serde_json::{Map, Value, json};

/// One parsed step.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolStep {
    Start {
        content: String,
    },
    Think {
        content: String,
    },
    Tool {
        content: String,
        tool_name: String,
        input: String,
    },
    /// An OBSERVE the model wrote itself. Echoed back, never acted on.
    Observe {
        content: String,
    },
    Output {
        content: String,
    },
    /// A well-formed step with a label outside the protocol.
    Other {
        step: String,
        content: String,
    },
}

impl ProtocolStep {
    /// Parse a raw model reply.
    pub fn parse(reply: &str) -> Result<Self, StepParseError> {
        let value: Value = serde_json::from_str(reply.trim())
            .map_err(|e| StepParseError::NotJson(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(StepParseError::NotAnObject);
        };

        let step = match fields.get("step") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            None | Some(Value::Null) => return Err(StepParseError::MissingStep),
            Some(Value::String(_)) => return Err(StepParseError::MissingStep),
            Some(_) => return Err(StepParseError::InvalidField("step")),
        };

        let content = loose_text(fields.get("content"));

        let parsed = match step.to_ascii_uppercase().as_str() {
            "START" => ProtocolStep::Start { content },
            "THINK" => ProtocolStep::Think { content },
            "OBSERVE" => ProtocolStep::Observe { content },
            "OUTPUT" => ProtocolStep::Output {
                content: strict_text(&fields, "content")?
                    .ok_or(StepParseError::InvalidField("content"))?,
            },
            "TOOL" => {
                let tool_name = strict_text(&fields, "tool_name")?
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or(StepParseError::MissingToolName)?;
                let input = strict_text(&fields, "input")?.unwrap_or_default();
                ProtocolStep::Tool {
                    content,
                    tool_name,
                    input,
                }
            }
            _ => ProtocolStep::Other { step, content },
        };

        Ok(parsed)
    }

    /// The step label as it goes on the wire.
    pub fn label(&self) -> &str {
        match self {
            ProtocolStep::Start { .. } => "START",
            ProtocolStep::Think { .. } => "THINK",
            ProtocolStep::Tool { .. } => "TOOL",
            ProtocolStep::Observe { .. } => "OBSERVE",
            ProtocolStep::Output { .. } => "OUTPUT",
            ProtocolStep::Other { step, .. } => step.as_str(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ProtocolStep::Start { content }
            | ProtocolStep::Think { content }
            | ProtocolStep::Tool { content, .. }
            | ProtocolStep::Observe { content }
            | ProtocolStep::Output { content }
            | ProtocolStep::Other { content, .. } => content.as_str(),
        }
    }

    /// Canonical JSON form, used as the assistant turn in the working
    /// conversation.
    pub fn to_json(&self) -> String {
        let value = match self {
            ProtocolStep::Tool {
                content,
                tool_name,
                input,
            } => json!({
                "step": "TOOL",
                "content": content,
                "tool_name": tool_name,
                "input": input,
            }),
            other => json!({
                "step": other.label(),
                "content": other.content(),
            }),
        };
        value.to_string()
    }
}

/// The OBSERVE message the loop injects after a tool call.
pub fn observation_json(content: Value) -> String {
    json!({ "step": "OBSERVE", "content": content }).to_string()
}

/// Text for descriptive fields: absent or null is empty, non-strings are
/// kept as their JSON text.
fn loose_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Text for fields the loop acts on: absent or null is `None`, anything but
/// a string is an error.
fn strict_text(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, StepParseError> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(StepParseError::InvalidField(name)),
    }
}

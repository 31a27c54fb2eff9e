//! Shared test helpers for agent tests.

use async_trait::async_trait;
use copycat_core::error::{ProviderError, ToolError};
use copycat_core::message::{Message, Role};
use copycat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use copycat_core::tool::{Tool, ToolContext, ToolOutput, ToolRegistry};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A mock provider that returns a sequence of scripted replies.
///
/// Each call to `complete` returns the next reply in the queue and records
/// the request. Panics if more calls are made than replies provided.
pub struct SequentialMockProvider {
    replies: Vec<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The messages sent on the `n`-th call.
    pub fn request(&self, n: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[n].messages.clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let n = requests.len();
        if n >= self.replies.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                n,
                self.replies.len()
            );
        }
        requests.push(request);
        Ok(make_text_response(&self.replies[n]))
    }
}

/// Replies chosen by the run's user prompt and how far the run has got,
/// so concurrent runs never share a script position.
pub struct KeyedMockProvider {
    scripts: HashMap<String, Vec<String>>,
}

impl KeyedMockProvider {
    pub fn new(scripts: &[(&str, &[&str])]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }
}

#[async_trait]
impl Provider for KeyedMockProvider {
    fn name(&self) -> &str {
        "keyed_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let user_pos = request
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .expect("request has a user message");
        let prompt = &request.messages[user_pos].content;
        let position = request.messages[user_pos..]
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count();

        // Yield so concurrent runs interleave.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let reply = &self.scripts[prompt][position];
        Ok(make_text_response(reply))
    }
}

/// Always fails like an unreachable endpoint.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Never answers within any reasonable time.
pub struct StalledProvider;

#[async_trait]
impl Provider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(make_text_response(r#"{"step":"OUTPUT","content":"late"}"#))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Echoes its input.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the input back"
    }
    fn input_description(&self) -> &str {
        "text: string"
    }
    async fn invoke(&self, input: &str, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(format!("echo: {input}")))
    }
}

/// Stands in for the site cloner, reporting a fixed site id.
pub struct FakeClonerTool;

#[async_trait]
impl Tool for FakeClonerTool {
    fn name(&self) -> &str {
        "webCloner"
    }
    fn description(&self) -> &str {
        "Clone a site"
    }
    fn input_description(&self) -> &str {
        "url: string"
    }
    async fn invoke(&self, input: &str, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        if input.contains("broken") {
            return Err(ToolError::ExecutionFailed {
                tool_name: "webCloner".into(),
                reason: "page did not load".into(),
            });
        }
        Ok(ToolOutput::structured(
            "cloned",
            serde_json::json!({
                "siteId": "site42",
                "outputDir": "./public/cloned-sites/site42",
                "success": true,
            }),
        ))
    }
}

pub fn test_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool));
    registry.register(Box::new(FakeClonerTool));
    registry
}

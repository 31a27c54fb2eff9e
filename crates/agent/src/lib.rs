//! # CopyCat Agent
//!
//! The tool-orchestration loop. A run seeds a working conversation with the
//! system prompt, the stored history and the new user prompt, then asks the
//! model for one protocol step at a time:
//!
//! - `TOOL` steps are dispatched through the registry and answered with an
//!   `OBSERVE` before the next model call
//! - `OUTPUT` ends the run
//! - everything else is recorded and the loop continues
//!
//! Runs are bounded by an iteration cap, an optional deadline and a
//! cancellation token. [`ChatService`] wraps a run with conversation
//! persistence.

pub mod loop_runner;
pub mod presentation;
pub mod prompt;
pub mod step;
pub mod turn;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentLoop, AgentRun, RunOutcome, ToolInvocation};
pub use step::ProtocolStep;
pub use turn::{ChatService, TurnReply};

use std::sync::Arc;
use std::time::Duration;

use copycat_config::AppConfig;
use copycat_core::event::EventBus;
use copycat_core::provider::Provider;
use copycat_core::tool::ToolRegistry;

/// Build an agent loop with the budget and model settings from `config`.
pub fn agent_from_config(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
) -> AgentLoop {
    let deadline = match config.agent.deadline_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let mut agent = AgentLoop::new(
        provider,
        &config.provider.model,
        config.provider.temperature,
        tools,
        event_bus,
    )
    .with_max_iterations(config.agent.max_iterations)
    .with_deadline(deadline);

    if let Some(max_tokens) = config.provider.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }
    agent
}

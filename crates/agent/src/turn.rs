//! One conversational turn: load the chat, run the agent, persist the reply.

use std::sync::Arc;

use copycat_core::message::{ConversationId, Message};
use copycat_core::store::ConversationStore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::loop_runner::{AgentLoop, RunOutcome};

/// What the caller of a turn gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub success: bool,
    pub reply: String,
}

/// Ties the agent loop to a conversation store.
#[derive(Clone)]
pub struct ChatService {
    agent: Arc<AgentLoop>,
    store: Arc<dyn ConversationStore>,
}

impl ChatService {
    pub fn new(agent: Arc<AgentLoop>, store: Arc<dyn ConversationStore>) -> Self {
        Self { agent, store }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    /// Process one user prompt against a stored chat.
    pub async fn process_turn(
        &self,
        chat_id: &ConversationId,
        prompt: &str,
    ) -> Result<TurnReply, copycat_core::Error> {
        self.process_turn_with_cancel(chat_id, prompt, &CancellationToken::new())
            .await
    }

    /// [`process_turn`](Self::process_turn) with a caller-owned cancellation
    /// token.
    ///
    /// The user message is stored before the agent runs and is kept even if
    /// the run fails. Only a completed run stores an assistant reply.
    pub async fn process_turn_with_cancel(
        &self,
        chat_id: &ConversationId,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReply, copycat_core::Error> {
        let chat = self.store.load(chat_id).await?;
        self.store.append(chat_id, Message::user(prompt)).await?;

        let run = self
            .agent
            .run(chat_id, &chat.messages, prompt, cancel)
            .await?;

        match run.outcome {
            RunOutcome::Completed { reply, .. } => {
                self.store
                    .append(chat_id, Message::assistant(reply.clone()))
                    .await?;
                info!(chat_id = %chat_id, iterations = run.iterations, "Turn completed");
                Ok(TurnReply {
                    success: true,
                    reply,
                })
            }
            RunOutcome::NoReply => {
                warn!(chat_id = %chat_id, "Turn ended without a reply");
                Ok(TurnReply {
                    success: false,
                    reply: "The assistant returned an empty reply. Please try again.".into(),
                })
            }
            RunOutcome::Inconclusive { reason } => {
                warn!(chat_id = %chat_id, reason = %reason, "Turn was inconclusive");
                Ok(TurnReply {
                    success: false,
                    reply: format!("I could not finish this request ({reason}). Please try again."),
                })
            }
        }
    }
}

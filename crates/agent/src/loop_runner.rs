//! The agent reasoning loop implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use copycat_core::event::{DomainEvent, EventBus};
use copycat_core::message::{ConversationId, Message};
use copycat_core::provider::{Provider, ProviderRequest};
use copycat_core::tool::{Dispatch, ToolContext, ToolOutput, ToolRegistry};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::presentation;
use crate::prompt;
use crate::step::{ProtocolStep, observation_json};

/// The tool whose result earns preview/download links in the reply.
pub const CLONE_TOOL: &str = "webCloner";

/// One resolved TOOL step.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub input: String,
    pub success: bool,
    /// The tool's output, or the failure text on error.
    pub output: ToolOutput,
}

impl ToolInvocation {
    fn from_dispatch(name: String, input: String, dispatch: &Dispatch) -> Self {
        let output = match dispatch {
            Dispatch::Completed(output) => output.clone(),
            Dispatch::Failed(message) => ToolOutput::text(message.clone()),
            Dispatch::UnknownTool(_) => ToolOutput::text(dispatch.observation().to_string()),
        };
        Self {
            name,
            input,
            success: dispatch.is_success(),
            output,
        }
    }

    /// `siteId` from a successful clone.
    pub fn site_id(&self) -> Option<&str> {
        if self.name != CLONE_TOOL || !self.success {
            return None;
        }
        self.output.data.as_ref()?.get("siteId")?.as_str()
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The model produced an OUTPUT step.
    Completed {
        reply: String,
        /// The most recent tool invocation of the run, if any.
        side_effect: Option<ToolInvocation>,
    },
    /// The model returned an empty reply.
    NoReply,
    /// The run budget ran out or the run was cancelled.
    Inconclusive { reason: String },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Completed { .. } => "completed",
            RunOutcome::NoReply => "no_reply",
            RunOutcome::Inconclusive { .. } => "inconclusive",
        }
    }
}

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: RunOutcome,
    /// Messages added during the run: assistant steps and observations,
    /// in order. The seed (system prompt, history, user prompt) is not
    /// included.
    pub steps: Vec<Message>,
    /// Model calls made.
    pub iterations: u32,
    /// Replies dropped because they were not valid steps.
    pub discarded_replies: u32,
}

enum Bounded<T> {
    Done(T),
    Cancelled,
    TimedOut,
}

/// Drives the model through the step protocol.
///
/// Holds only shared, read-only state, so one loop can serve any number
/// of concurrent runs.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Generated once from the registry
    system_prompt: String,

    /// Maximum model calls per run
    max_iterations: u32,

    /// Wall-clock bound per run
    deadline: Option<Duration>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let system_prompt = prompt::system_prompt(&tools);
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            system_prompt,
            max_iterations: 25,
            deadline: Some(Duration::from_secs(300)),
            event_bus,
        }
    }

    /// Set the maximum number of model calls per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the wall-clock bound per run. `None` disables it.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one user turn to completion.
    ///
    /// `history` is the stored conversation; it is not modified. Provider
    /// failures are returned as errors; everything else (malformed replies,
    /// tool errors, budget exhaustion) is reflected in the returned
    /// [`AgentRun`].
    pub async fn run(
        &self,
        conversation_id: &ConversationId,
        history: &[Message],
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<AgentRun, copycat_core::Error> {
        info!(
            conversation_id = %conversation_id,
            history = history.len(),
            "Starting agent run"
        );

        let deadline_at = self.deadline.map(|d| Instant::now() + d);

        let mut working = Vec::with_capacity(history.len() + 2);
        working.push(Message::system(&self.system_prompt));
        working.extend(history.iter().cloned());
        working.push(Message::user(user_prompt));
        let seed_len = working.len();

        let mut iterations = 0u32;
        let mut discarded_replies = 0u32;
        let mut last_invocation: Option<ToolInvocation> = None;

        let outcome = loop {
            if cancel.is_cancelled() {
                break inconclusive("run was cancelled");
            }
            if iterations >= self.max_iterations {
                warn!(
                    conversation_id = %conversation_id,
                    iterations,
                    "Iteration budget exhausted"
                );
                break inconclusive(format!(
                    "iteration budget of {} exhausted",
                    self.max_iterations
                ));
            }
            if deadline_at.is_some_and(|at| Instant::now() >= at) {
                break inconclusive("deadline exceeded");
            }

            iterations += 1;
            debug!(
                conversation_id = %conversation_id,
                iteration = iterations,
                "Agent loop iteration"
            );

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: working.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let response = match bounded(cancel, deadline_at, self.provider.complete(request)).await
            {
                Bounded::Done(result) => result?,
                Bounded::Cancelled => break inconclusive("run was cancelled"),
                Bounded::TimedOut => break inconclusive("deadline exceeded"),
            };

            // Track token usage
            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id: conversation_id.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: chrono::Utc::now(),
                });
            }

            let reply = response.message.content;
            if reply.is_empty() {
                info!(conversation_id = %conversation_id, "Model returned an empty reply");
                break RunOutcome::NoReply;
            }

            let step = match ProtocolStep::parse(&reply) {
                Ok(step) => step,
                Err(e) => {
                    discarded_replies += 1;
                    warn!(
                        conversation_id = %conversation_id,
                        error = %e,
                        reply = %truncate_for_log(&reply),
                        "Discarding malformed reply"
                    );
                    self.event_bus.publish(DomainEvent::ReplyDiscarded {
                        conversation_id: conversation_id.to_string(),
                        reason: e.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                    continue;
                }
            };

            debug!(step = step.label(), "Model step");
            working.push(Message::assistant(step.to_json()));

            match step {
                ProtocolStep::Output { content } => {
                    break RunOutcome::Completed {
                        reply: content,
                        side_effect: last_invocation.take(),
                    };
                }
                ProtocolStep::Tool {
                    tool_name, input, ..
                } => {
                    let ctx = ToolContext::new(cancel.clone());
                    let started = std::time::Instant::now();
                    let dispatch = match bounded(
                        cancel,
                        deadline_at,
                        self.tools.dispatch(&tool_name, &input, &ctx),
                    )
                    .await
                    {
                        Bounded::Done(dispatch) => dispatch,
                        Bounded::Cancelled => break inconclusive("run was cancelled"),
                        Bounded::TimedOut => break inconclusive("deadline exceeded"),
                    };
                    let duration_ms = started.elapsed().as_millis() as u64;

                    self.event_bus.publish(DomainEvent::ToolExecuted {
                        conversation_id: conversation_id.to_string(),
                        tool_name: tool_name.clone(),
                        success: dispatch.is_success(),
                        duration_ms,
                        timestamp: chrono::Utc::now(),
                    });

                    working.push(Message::observation(observation_json(
                        dispatch.observation(),
                    )));

                    if !matches!(dispatch, Dispatch::UnknownTool(_)) {
                        last_invocation =
                            Some(ToolInvocation::from_dispatch(tool_name, input, &dispatch));
                    }
                }
                ProtocolStep::Start { .. }
                | ProtocolStep::Think { .. }
                | ProtocolStep::Observe { .. }
                | ProtocolStep::Other { .. } => {}
            }
        };

        let outcome = with_clone_links(outcome);

        info!(
            conversation_id = %conversation_id,
            outcome = outcome.label(),
            iterations,
            discarded_replies,
            "Agent run finished"
        );
        self.event_bus.publish(DomainEvent::RunFinished {
            conversation_id: conversation_id.to_string(),
            outcome: outcome.label().to_string(),
            iterations,
            timestamp: chrono::Utc::now(),
        });

        Ok(AgentRun {
            outcome,
            steps: working.split_off(seed_len),
            iterations,
            discarded_replies,
        })
    }
}

fn inconclusive(reason: impl Into<String>) -> RunOutcome {
    RunOutcome::Inconclusive {
        reason: reason.into(),
    }
}

/// Append preview/download links when the run's last tool call was a
/// successful clone.
fn with_clone_links(outcome: RunOutcome) -> RunOutcome {
    match outcome {
        RunOutcome::Completed {
            mut reply,
            side_effect,
        } => {
            if let Some(invocation) = &side_effect
                && let Some(site_id) = invocation.site_id()
            {
                let output_dir = invocation
                    .output
                    .data
                    .as_ref()
                    .and_then(|d| d.get("outputDir"))
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| presentation::default_clone_dir(site_id));
                reply.push_str(&presentation::clone_links(site_id, &output_dir));
            }
            RunOutcome::Completed { reply, side_effect }
        }
        other => other,
    }
}

/// Race `fut` against the cancellation token and the run deadline.
async fn bounded<T>(
    cancel: &CancellationToken,
    deadline_at: Option<Instant>,
    fut: impl Future<Output = T>,
) -> Bounded<T> {
    let expired = async {
        match deadline_at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        _ = expired => Bounded::TimedOut,
        value = fut => Bounded::Done(value),
    }
}

fn truncate_for_log(reply: &str) -> &str {
    let mut end = reply.len().min(200);
    while !reply.is_char_boundary(end) {
        end -= 1;
    }
    &reply[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use copycat_core::message::Role;

    const OUTPUT_HI: &str = r#"{"step":"OUTPUT","content":"hi"}"#;

    fn agent(provider: Arc<dyn Provider>) -> AgentLoop {
        AgentLoop::new(
            provider,
            "mock-model",
            0.2,
            Arc::new(test_registry()),
            Arc::new(EventBus::default()),
        )
    }

    async fn run(agent: &AgentLoop, prompt: &str) -> AgentRun {
        agent
            .run(
                &ConversationId::from("chat-1"),
                &[],
                prompt,
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    fn observe_content(message: &Message) -> serde_json::Value {
        assert_eq!(message.role, Role::Observation);
        let value: serde_json::Value = serde_json::from_str(&message.content).unwrap();
        assert_eq!(value["step"], "OBSERVE");
        value["content"].clone()
    }

    #[tokio::test]
    async fn output_step_ends_run_with_its_content() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"START","content":"greeting"}"#,
            r#"{"step":"THINK","content":"say hi"}"#,
            OUTPUT_HI,
        ]));
        let agent = agent(provider.clone());

        let run = run(&agent, "hello").await;
        match &run.outcome {
            RunOutcome::Completed { reply, side_effect } => {
                assert_eq!(reply, "hi");
                assert!(side_effect.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(run.iterations, 3);
        assert_eq!(run.steps.len(), 3);
        assert!(run.steps.iter().all(|m| m.role == Role::Assistant));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn seed_is_system_history_then_prompt() {
        let provider = Arc::new(SequentialMockProvider::new(&[OUTPUT_HI]));
        let agent = agent(provider.clone());
        let history = vec![Message::user("earlier"), Message::assistant("noted")];

        agent
            .run(
                &ConversationId::from("chat-1"),
                &history,
                "now",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = provider.request(0);
        let roles: Vec<Role> = sent.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(sent[0].content.contains("webCloner(url: string)"));
        assert_eq!(sent[3].content, "now");
    }

    #[tokio::test]
    async fn malformed_replies_are_discarded_and_retried() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            "Sure, let me help with that!",
            "```json\n{\"step\":\"OUTPUT\",\"content\":\"x\"}\n```",
            r#"{"step":"TOOL","content":"no name"}"#,
            OUTPUT_HI,
        ]));
        let agent = agent(provider.clone());

        let run = run(&agent, "hello").await;
        assert!(matches!(run.outcome, RunOutcome::Completed { .. }));
        assert_eq!(run.discarded_replies, 3);
        assert_eq!(run.iterations, 4);
        assert_eq!(run.steps.len(), 1);

        // The retry sees exactly the seed: nothing was appended.
        assert_eq!(provider.request(3).len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_yields_one_synthetic_observation() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"TOOL","content":"try","tool_name":"teleport","input":"mars"}"#,
            OUTPUT_HI,
        ]));
        let agent = agent(provider.clone());

        let run = run(&agent, "go").await;
        assert_eq!(run.steps.len(), 3);
        assert_eq!(run.steps[0].role, Role::Assistant);
        assert_eq!(observe_content(&run.steps[1]), "Tool teleport not found");
        assert_eq!(run.steps[2].role, Role::Assistant);

        match run.outcome {
            RunOutcome::Completed { side_effect, .. } => assert!(side_effect.is_none()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_result_is_observed_before_next_model_call() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"TOOL","content":"echo it","tool_name":"echo","input":"hello"}"#,
            OUTPUT_HI,
        ]));
        let agent = agent(provider.clone());

        let run = run(&agent, "echo hello").await;

        let second = provider.request(1);
        let last = second.last().unwrap();
        assert_eq!(observe_content(last), "echo: hello");
        let tool_turn = &second[second.len() - 2];
        assert_eq!(tool_turn.role, Role::Assistant);
        assert!(tool_turn.content.contains(r#""tool_name":"echo""#));

        match run.outcome {
            RunOutcome::Completed { side_effect, .. } => {
                let invocation = side_effect.unwrap();
                assert_eq!(invocation.name, "echo");
                assert!(invocation.success);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_failure_is_data() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"TOOL","content":"clone","tool_name":"webCloner","input":"https://broken.test"}"#,
            r#"{"step":"OUTPUT","content":"sorry"}"#,
        ]));
        let agent = agent(provider);

        let run = run(&agent, "clone broken").await;
        let observed = observe_content(&run.steps[1]);
        assert!(observed.as_str().unwrap().starts_with("Error: "));

        match run.outcome {
            RunOutcome::Completed { reply, side_effect } => {
                assert_eq!(reply, "sorry");
                assert!(!side_effect.unwrap().success);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_clone_appends_links() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"TOOL","content":"clone","tool_name":"webCloner","input":"https://example.com"}"#,
            r#"{"step":"OUTPUT","content":"Your site is ready."}"#,
        ]));
        let agent = agent(provider);

        let run = run(&agent, "clone example.com").await;
        let observed = observe_content(&run.steps[1]);
        assert_eq!(observed["siteId"], "site42");

        let RunOutcome::Completed { reply, .. } = run.outcome else {
            panic!("expected completion");
        };
        assert!(reply.starts_with("Your site is ready."));
        assert!(reply.contains(r#"href="/editor/site42""#));
        assert!(reply.contains("dir=.%2Fpublic%2Fcloned-sites%2Fsite42"));
    }

    #[tokio::test]
    async fn links_follow_only_the_latest_invocation() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"TOOL","content":"clone","tool_name":"webCloner","input":"https://example.com"}"#,
            r#"{"step":"TOOL","content":"echo","tool_name":"echo","input":"x"}"#,
            OUTPUT_HI,
        ]));
        let agent = agent(provider);

        let RunOutcome::Completed { reply, .. } = run(&agent, "both").await.outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn empty_reply_is_no_reply() {
        let provider = Arc::new(SequentialMockProvider::new(&[""]));
        let agent = agent(provider);

        let run = run(&agent, "hello").await;
        assert!(matches!(run.outcome, RunOutcome::NoReply));
        assert!(run.steps.is_empty());
    }

    #[tokio::test]
    async fn whitespace_reply_is_discarded_and_retried() {
        let provider = Arc::new(SequentialMockProvider::new(&["   \n", OUTPUT_HI]));
        let agent = agent(provider.clone());

        let run = run(&agent, "hello").await;

        assert_eq!(run.discarded_replies, 1);
        assert_eq!(provider.call_count(), 2);
        let RunOutcome::Completed { reply, .. } = run.outcome else {
            panic!("expected completion");
        };
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn iteration_budget_is_inconclusive() {
        let think = r#"{"step":"THINK","content":"hmm"}"#;
        let provider = Arc::new(SequentialMockProvider::new(&[think, think, think]));
        let agent = agent(provider.clone()).with_max_iterations(3);

        let run = run(&agent, "loop forever").await;
        match run.outcome {
            RunOutcome::Inconclusive { reason } => assert!(reason.contains("budget")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(run.iterations, 3);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn cancelled_run_makes_no_calls() {
        let provider = Arc::new(SequentialMockProvider::new(&[OUTPUT_HI]));
        let agent = agent(provider.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = agent
            .run(&ConversationId::from("c"), &[], "hello", &cancel)
            .await
            .unwrap();
        assert!(matches!(run.outcome, RunOutcome::Inconclusive { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_stalled_model() {
        let agent =
            agent(Arc::new(StalledProvider)).with_deadline(Some(Duration::from_secs(5)));

        let run = run(&agent, "hello").await;
        match run.outcome {
            RunOutcome::Inconclusive { reason } => assert!(reason.contains("deadline")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(run.iterations, 1);
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let agent = agent(Arc::new(FailingProvider));
        let err = agent
            .run(
                &ConversationId::from("c"),
                &[],
                "hello",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, copycat_core::Error::Provider(_)));
    }

    #[tokio::test]
    async fn run_publishes_events() {
        let provider = Arc::new(SequentialMockProvider::new(&[
            r#"{"step":"TOOL","content":"e","tool_name":"echo","input":"x"}"#,
            OUTPUT_HI,
        ]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = AgentLoop::new(
            provider,
            "mock-model",
            0.2,
            Arc::new(test_registry()),
            bus.clone(),
        );

        run(&agent, "hello").await;

        let mut tools = 0;
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::ToolExecuted {
                    tool_name, success, ..
                } => {
                    assert_eq!(tool_name, "echo");
                    assert!(*success);
                    tools += 1;
                }
                DomainEvent::RunFinished { outcome, .. } => finished = Some(outcome.clone()),
                _ => {}
            }
        }
        assert_eq!(tools, 1);
        assert_eq!(finished.as_deref(), Some("completed"));
    }

    #[tokio::test]
    async fn concurrent_runs_stay_separate() {
        let provider = Arc::new(KeyedMockProvider::new(&[
            (
                "first",
                &[
                    r#"{"step":"TOOL","content":"a","tool_name":"echo","input":"one"}"#,
                    r#"{"step":"OUTPUT","content":"done one"}"#,
                ],
            ),
            (
                "second",
                &[
                    r#"{"step":"THINK","content":"b"}"#,
                    r#"{"step":"TOOL","content":"b","tool_name":"echo","input":"two"}"#,
                    r#"{"step":"OUTPUT","content":"done two"}"#,
                ],
            ),
        ]));
        let agent = Arc::new(agent(provider));

        let a = {
            let agent = agent.clone();
            tokio::spawn(async move { run(&agent, "first").await })
        };
        let b = {
            let agent = agent.clone();
            tokio::spawn(async move { run(&agent, "second").await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a.steps.len(), 3);
        assert_eq!(observe_content(&a.steps[1]), "echo: one");
        assert!(matches!(a.outcome, RunOutcome::Completed { ref reply, .. } if reply == "done one"));

        assert_eq!(b.steps.len(), 4);
        assert_eq!(observe_content(&b.steps[2]), "echo: two");
        assert!(matches!(b.outcome, RunOutcome::Completed { ref reply, .. } if reply == "done two"));
    }
}

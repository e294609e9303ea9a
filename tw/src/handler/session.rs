//! Handler session and the multi-step tool-calling loop
//!
//! Within one user turn the session moves AwaitingUser → Thinking →
//! ToolDispatch → Thinking → … → Final. Tool results accumulate in a
//! turn-local working history that is committed to the conversation only
//! when the turn ends cleanly; a failed turn leaves the conversation
//! untouched.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::domain::{FailureReason, ResourceKind, SubtaskRequest, TaskError, TaskResult};
use crate::llm::{ChatMessage, ModelProvider, ProviderRequest, StopReason, ToolCall};
use crate::tools::{RegisteredTool, ToolContext, ToolRegistry};

use super::{ConversationHistory, ResourceMetrics};

/// Plan-mode prefix detected in passthrough input
const PLAN_PREFIX: &str = "/plan ";

/// Instruction injected for plan-mode turns
const PLAN_INSTRUCTION: &str = "Enclose your entire response in <plan>...</plan> tags. Do not execute the plan.";

/// Everything the Atomic Executor hands to `execute_prompt`
#[derive(Debug, Clone, Default)]
pub struct PromptSpec {
    pub user_prompt: String,
    pub template_system_prompt: Option<String>,
    pub context_string: Option<String>,
    pub included_files: Vec<String>,
    /// Tool allowlist; `None` exposes every registered tool
    pub tool_names: Option<Vec<String>>,
}

impl PromptSpec {
    pub fn from_prompt(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            ..Default::default()
        }
    }
}

/// A suspended turn: working history plus the tool calls still to resolve
struct PendingTurn {
    working: Vec<ChatMessage>,
    queue: VecDeque<ToolCall>,
    /// Subtask call dispatched as a CONTINUATION, awaiting its response
    awaiting: Option<ToolCall>,
    executed: u32,
    template_prompt: Option<String>,
    context_string: Option<String>,
    tool_names: Option<Vec<String>>,
}

impl PendingTurn {
    fn new(first_message: ChatMessage) -> Self {
        Self {
            working: vec![first_message],
            queue: VecDeque::new(),
            awaiting: None,
            executed: 0,
            template_prompt: None,
            context_string: None,
            tool_names: None,
        }
    }
}

/// One conversation session with resource accounting and a tool registry
pub struct Handler {
    session_id: String,
    provider: Arc<dyn ModelProvider>,
    registry: ToolRegistry,
    history: ConversationHistory,
    metrics: ResourceMetrics,
    base_prompt: String,
    max_response_tokens: u32,
    tool_budget: u32,
    turn_budget: Duration,
    tool_ctx: ToolContext,
    cancel: CancelToken,
    pending: Option<PendingTurn>,
}

impl Handler {
    /// Create a session rooted at `root` for file-touching tools
    pub fn new(provider: Arc<dyn ModelProvider>, config: &Config, registry: ToolRegistry, base_prompt: impl Into<String>, root: PathBuf) -> Self {
        let session_id = format!("session_{}", Uuid::new_v4().simple());
        let window = provider.context_window(&config.llm.model);
        let context_limit = (window as f64 * config.limits.max_context_window_fraction).floor() as u32;
        let cancel = CancelToken::new();

        debug!(%session_id, context_limit, "Handler::new: called");
        Self {
            tool_ctx: ToolContext::new(root, session_id.clone()).with_cancel(cancel.clone()),
            session_id,
            provider,
            registry,
            history: ConversationHistory::new(),
            metrics: ResourceMetrics::new(config.limits.max_turns, context_limit),
            base_prompt: base_prompt.into(),
            max_response_tokens: config.llm.max_tokens,
            tool_budget: config.limits.max_tool_calls_per_turn,
            turn_budget: Duration::from_millis(config.limits.turn_timeout_ms),
            cancel,
            pending: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn get_resource_metrics(&self) -> ResourceMetrics {
        self.metrics.clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Register a direct tool on this session
    pub fn register_direct_tool(&mut self, tool: Arc<dyn crate::tools::DirectTool>) {
        self.registry.register_direct(tool);
    }

    /// Register a subtask tool; its invocation yields a CONTINUATION
    pub fn register_subtask_tool(&mut self, name: impl Into<String>, template_hints: Vec<String>) {
        self.registry.register_subtask(name, template_hints);
    }

    /// Process one user turn
    ///
    /// Returns COMPLETE with the final assistant text, CONTINUATION when a
    /// subtask tool was invoked, or FAILED carrying the error.
    pub async fn handle_query(&mut self, user_text: &str) -> TaskResult {
        let message = match user_text.strip_prefix(PLAN_PREFIX) {
            Some(rest) => ChatMessage::user(format!("{}\n\n{}", rest, PLAN_INSTRUCTION)),
            None => ChatMessage::user(user_text),
        };

        let turn = PendingTurn::new(message);
        self.drive_with_budget(turn).await
    }

    /// Execute a resolved atomic prompt through this session
    pub async fn execute_prompt(&mut self, spec: PromptSpec) -> TaskResult {
        let mut turn = PendingTurn::new(ChatMessage::user(spec.user_prompt.clone()));
        turn.template_prompt = spec.template_system_prompt;
        turn.context_string = spec.context_string;
        turn.tool_names = spec.tool_names;
        self.drive_with_budget(turn).await
    }

    /// Inject the orchestrator's answer to a dispatched subtask tool call
    ///
    /// Idempotent: repeating the same (tool_call_id, content) is a no-op
    /// because the awaiting slot is cleared on first injection and the
    /// history layer drops duplicate ids.
    pub fn add_tool_response(&mut self, tool_name: &str, content: impl Into<String>) -> Result<(), TaskError> {
        let turn = self.pending.as_mut().ok_or_else(|| {
            TaskError::failure(
                crate::domain::FailureReason::InvalidInput,
                "no suspended turn to receive a tool response",
            )
        })?;

        match turn.awaiting.take() {
            Some(call) if call.name == tool_name => {
                turn.working.push(ChatMessage::tool(tool_name, call.id, content));
                Ok(())
            }
            Some(call) => {
                let expected = call.name.clone();
                turn.awaiting = Some(call);
                Err(TaskError::failure(
                    crate::domain::FailureReason::InvalidInput,
                    format!("expected a response for '{}', got '{}'", expected, tool_name),
                ))
            }
            None => Ok(()), // duplicate injection
        }
    }

    /// Continue a turn suspended on a CONTINUATION
    pub async fn resume(&mut self) -> TaskResult {
        match self.pending.take() {
            Some(turn) => self.drive_with_budget(turn).await,
            None => TaskResult::failed(TaskError::failure(
                crate::domain::FailureReason::InvalidInput,
                "no suspended turn to resume",
            )),
        }
    }

    /// Enforce the per-turn wall-clock budget around the state machine
    ///
    /// Exceeding it fails the turn; tools already in flight are signalled
    /// through the cancellation token, never killed.
    async fn drive_with_budget(&mut self, turn: PendingTurn) -> TaskResult {
        let budget = self.turn_budget;
        match tokio::time::timeout(budget, self.drive(turn)).await {
            Ok(result) => result,
            Err(_) => {
                self.pending = None;
                // Signal whatever is still in flight, then re-arm the session
                self.cancel.cancel();
                self.cancel = CancelToken::new();
                self.tool_ctx = self.tool_ctx.clone().with_cancel(self.cancel.clone());
                TaskResult::failed(TaskError::failure(
                    FailureReason::Timeout,
                    format!("turn exceeded its {}ms wall-clock budget", budget.as_millis()),
                ))
            }
        }
    }

    /// Run the turn state machine until Final, failure, or CONTINUATION
    async fn drive(&mut self, mut turn: PendingTurn) -> TaskResult {
        loop {
            if let Err(err) = self.cancel.check() {
                self.pending = None;
                return TaskResult::failed(err);
            }

            // A previously dispatched subtask call with no response yet:
            // surface the same continuation again
            if let Some(ref call) = turn.awaiting {
                let request = subtask_request_for(&self.registry, call);
                self.pending = Some(turn);
                return TaskResult::continuation(request, String::new());
            }

            // ToolDispatch: resolve queued calls in provider order
            while let Some(call) = turn.queue.pop_front() {
                if turn.executed + 1 > self.tool_budget {
                    // Working history is discarded; the conversation is unchanged
                    self.pending = None;
                    return TaskResult::failed(TaskError::exhausted_because(
                        ResourceKind::Turns,
                        (turn.executed + 1) as u64,
                        self.tool_budget as u64,
                        "tool_budget_exceeded",
                    ));
                }

                match self.registry.get(&call.name).cloned() {
                    Some(RegisteredTool::Direct(tool)) => {
                        turn.executed += 1;
                        debug!(tool = %call.name, executed = turn.executed, "Handler::drive: direct tool");
                        let outcome = tool.execute(call.input.clone(), &self.tool_ctx).await;
                        let content = if outcome.is_error {
                            format!("error: {}", outcome.content)
                        } else {
                            outcome.content
                        };
                        turn.working.push(ChatMessage::tool(call.name.clone(), call.id.clone(), content));
                    }
                    Some(RegisteredTool::Subtask { .. }) => {
                        turn.executed += 1;
                        debug!(tool = %call.name, "Handler::drive: subtask tool, yielding continuation");
                        let request = subtask_request_for(&self.registry, &call);
                        turn.awaiting = Some(call);
                        self.pending = Some(turn);
                        return TaskResult::continuation(request, String::new());
                    }
                    None => {
                        turn.working.push(ChatMessage::tool(
                            call.name.clone(),
                            call.id.clone(),
                            format!("error: unknown tool '{}'", call.name),
                        ));
                    }
                }
            }

            // Thinking: enforce limits, then dispatch
            if let Err(err) = self.metrics.check_turns() {
                self.pending = None;
                return TaskResult::failed(err);
            }

            let request = self.build_request(&turn);
            let estimated = self.estimate_payload(&request);
            if let Err(err) = self.metrics.check_context(estimated) {
                self.pending = None;
                return TaskResult::failed(err);
            }

            let response = match self.provider.send_message(request).await {
                Ok(response) => response,
                Err(err) => {
                    self.pending = None;
                    return TaskResult::failed(err.into());
                }
            };
            self.metrics.record_assistant_turn();

            if response.stop_reason == StopReason::MaxTokens {
                let content = response.content.unwrap_or_default();
                self.pending = None;
                return TaskResult::failed_with_content(
                    TaskError::exhausted(
                        ResourceKind::Output,
                        response.usage.output_tokens,
                        self.max_response_tokens as u64,
                    ),
                    content,
                );
            }

            if response.tool_calls.is_empty() {
                // Final: commit the working history atomically
                let content = response.content.unwrap_or_default();
                turn.working.push(ChatMessage::assistant(&content));
                self.history.commit(turn.working);
                self.pending = None;

                let mut result = TaskResult::complete(content);
                result
                    .notes
                    .set_extra("tokens_used", serde_json::json!(response.usage.total()));
                return result;
            }

            turn.working.push(ChatMessage::assistant_with_calls(
                response.content.unwrap_or_default(),
                response.tool_calls.clone(),
            ));
            turn.queue = response.tool_calls.into();
        }
    }

    /// Assemble the provider payload: system-prompt hierarchy, committed
    /// history plus working history, tool definitions
    fn build_request(&self, turn: &PendingTurn) -> ProviderRequest {
        let mut system = self.base_prompt.clone();
        if let Some(ref template) = turn.template_prompt {
            system = format!("{}\n===\n{}", system, template);
        }
        if let Some(ref context) = turn.context_string {
            system = format!("{}\n===\n{}", system, context);
        }

        let mut messages: Vec<ChatMessage> = self.history.messages().to_vec();
        messages.extend(turn.working.iter().cloned());

        let tools = match turn.tool_names {
            Some(ref names) => self
                .registry
                .definitions()
                .into_iter()
                .filter(|d| names.contains(&d.name))
                .collect(),
            None => self.registry.definitions(),
        };

        ProviderRequest {
            system_prompt: system,
            messages,
            tools,
            max_tokens: self.max_response_tokens,
        }
    }

    fn estimate_payload(&self, request: &ProviderRequest) -> u32 {
        let mut tokens = self.provider.estimate_tokens(&request.system_prompt);
        for message in &request.messages {
            tokens += self.provider.estimate_tokens(&message.content);
        }
        tokens
    }
}

/// Build the subtask request for a subtask tool call
fn subtask_request_for(registry: &ToolRegistry, call: &ToolCall) -> SubtaskRequest {
    let hints = match registry.get(&call.name) {
        Some(RegisteredTool::Subtask { template_hints, .. }) => template_hints.clone(),
        _ => Vec::new(),
    };

    let mut request = SubtaskRequest::by_name(call.name.clone());
    request.template_hints = hints;
    if let Some(object) = call.input.as_object() {
        for (key, value) in object {
            request.inputs.insert(key.clone(), value.clone());
        }
    }
    request
}

//! Dispatcher - thin router over the execution substrate
//!
//! `(` → evaluator; `/task name key=val …` → atomic path; `/task (sexpr)` →
//! evaluator; `/plan …` and free text → chat Handler. Errors come back as
//! FAILED results, never as panics or raw errors.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::domain::{FailureReason, SubtaskRequest, TaskError, TaskResult, TaskStatus};
use crate::handler::Handler;
use crate::llm::ModelProvider;
use crate::memory::MemorySystem;
use crate::sexpr::{Environment, Evaluator};
use crate::task::TaskSystem;

fn key_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // key=value where value is a quoted string, a JSON array/object, or a bare word
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][A-Za-z0-9_]*)=("(?:[^"\\]|\\.)*"|\[[^\]]*\]|\{[^}]*\}|\S+)"#)
            .expect("key=value regex")
    })
}

/// Routes external requests to the Handler, Task System, or Evaluator
pub struct Dispatcher {
    task_system: Arc<TaskSystem>,
    memory: Arc<MemorySystem>,
    evaluator: Evaluator,
    chat: Handler,
    /// Top-level environment shared by every evaluator invocation
    env: Arc<Environment>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn ModelProvider>, config: Config, root: PathBuf) -> Result<Self, TaskError> {
        let memory = Arc::new(MemorySystem::new());
        let task_system = TaskSystem::bootstrap(provider, config, memory.clone(), root)?;
        let evaluator = Evaluator::new(task_system.clone(), memory.clone());
        let chat = task_system.make_handler();

        Ok(Self {
            task_system,
            memory,
            evaluator,
            chat,
            env: Environment::root(),
        })
    }

    pub fn task_system(&self) -> &Arc<TaskSystem> {
        &self.task_system
    }

    pub fn memory(&self) -> &Arc<MemorySystem> {
        &self.memory
    }

    pub fn evaluator_mut(&mut self) -> &mut Evaluator {
        &mut self.evaluator
    }

    /// The persistent chat session
    pub fn chat_mut(&mut self) -> &mut Handler {
        &mut self.chat
    }

    /// Route one external request
    pub async fn dispatch(&mut self, input: &str) -> TaskResult {
        let trimmed = input.trim();
        debug!(input = %trimmed.chars().take(60).collect::<String>(), "Dispatcher::dispatch: called");

        if trimmed.starts_with('(') {
            return self.evaluator.run(trimmed, &self.env).await;
        }

        if let Some(rest) = trimmed.strip_prefix("/task ") {
            let rest = rest.trim();
            if rest.starts_with('(') {
                return self.evaluator.run(rest, &self.env).await;
            }
            return match parse_task_command(rest) {
                Ok(request) => self.task_system.execute_atomic_template(&request).await,
                Err(err) => TaskResult::failed(err),
            };
        }

        if trimmed.starts_with("/plan ") {
            // The Handler detects the prefix and injects the plan instruction
            return self.chat_turn(trimmed).await;
        }

        if trimmed.starts_with('/') {
            return TaskResult::failed(TaskError::failure(
                FailureReason::UnknownCommand,
                format!("unknown command: {}", trimmed.split_whitespace().next().unwrap_or(trimmed)),
            ));
        }

        self.chat_turn(trimmed).await
    }

    /// One chat turn, resolving any subtask-tool continuations
    ///
    /// The Handler yields CONTINUATION for subtask tools; the dispatcher is
    /// the orchestrator that executes them and resumes the loop. The
    /// Handler's tool budget bounds the iterations.
    async fn chat_turn(&mut self, input: &str) -> TaskResult {
        let mut result = self.chat.handle_query(input).await;

        while result.status == TaskStatus::Continuation {
            let Some(request) = result.notes.subtask_request.clone() else {
                return TaskResult::failed(TaskError::failure(
                    FailureReason::SubtaskFailure,
                    "continuation carried no subtask request",
                ));
            };
            if let Err(err) = request.validate() {
                return TaskResult::failed(err);
            }

            let sub_result = self.task_system.execute_atomic_template(&request).await;
            let content = if sub_result.status == TaskStatus::Complete {
                sub_result.content
            } else {
                let cause = sub_result
                    .error()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "subtask did not complete".to_string());
                format!("error: subtask '{}' failed: {}", request.identifier(), cause)
            };

            if let Err(err) = self.chat.add_tool_response(&request.identifier(), content) {
                return TaskResult::failed(err);
            }
            result = self.chat.resume().await;
        }

        result
    }
}

/// Parse `name[:sub] key=value …` into a subtask request
///
/// Values parse as JSON when they look like it (quoted strings, arrays,
/// objects, numbers, booleans); everything else stays a bare string. A
/// `file_paths`/`file_context` key also populates the request's path
/// override.
fn parse_task_command(input: &str) -> Result<SubtaskRequest, TaskError> {
    let mut parts = input.splitn(2, char::is_whitespace);
    let identifier = parts.next().unwrap_or("").trim();
    if identifier.is_empty() {
        return Err(TaskError::failure(
            FailureReason::UnknownCommand,
            "/task requires a template identifier",
        ));
    }

    let mut request = SubtaskRequest::by_name(identifier);
    let remainder = parts.next().unwrap_or("");

    for capture in key_value_re().captures_iter(remainder) {
        let key = capture[1].to_string();
        let raw = &capture[2];
        let value = parse_value(raw);

        if key == "file_paths" || key == "file_context" {
            if let Some(paths) = value.as_array() {
                let paths: Vec<String> = paths
                    .iter()
                    .filter_map(|p| p.as_str())
                    .map(str::to_string)
                    .collect();
                request.file_paths = Some(paths);
            }
        }
        request.inputs.insert(key, value);
    }

    Ok(request)
}

fn parse_value(raw: &str) -> serde_json::Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => serde_json::json!(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    use crate::llm::ProviderResponse;
    use crate::llm::mock::MockProvider;
    use crate::task::{ProgrammaticExecutor, SharedServices};

    struct EchoExecutor;

    #[async_trait]
    impl ProgrammaticExecutor for EchoExecutor {
        fn name(&self) -> &str {
            "aider:automatic"
        }

        async fn execute(
            &self,
            inputs: &BTreeMap<String, serde_json::Value>,
            _services: &SharedServices,
        ) -> TaskResult {
            TaskResult::complete(serde_json::json!(inputs).to_string())
        }
    }

    fn dispatcher_with(provider: Arc<MockProvider>) -> Dispatcher {
        Dispatcher::new(provider, Config::default(), std::env::temp_dir()).unwrap()
    }

    #[test]
    fn test_parse_task_command_typed_values() {
        let request = parse_task_command("summarise path=\"a b.py\" count=3 verbose=true tag=plain").unwrap();

        assert_eq!(request.name.as_deref(), Some("summarise"));
        assert_eq!(request.inputs["path"], "a b.py");
        assert_eq!(request.inputs["count"], 3);
        assert_eq!(request.inputs["verbose"], true);
        assert_eq!(request.inputs["tag"], "plain");
    }

    #[test]
    fn test_parse_task_command_file_context_list() {
        let request = parse_task_command(r#"aider:automatic prompt="add docstring" file_context=["/a.py"]"#).unwrap();

        assert_eq!(request.inputs["prompt"], "add docstring");
        assert_eq!(request.file_paths, Some(vec!["/a.py".to_string()]));
        assert_eq!(request.inputs["file_context"][0], "/a.py");
    }

    #[test]
    fn test_parse_task_command_empty_is_error() {
        assert!(parse_task_command("").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_routes_sexpr() {
        let mut dispatcher = dispatcher_with(Arc::new(MockProvider::new(vec![])));
        let result = dispatcher.dispatch("(+ 1 2)").await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert_eq!(result.content, "3");
    }

    #[tokio::test]
    async fn test_dispatch_routes_task_sexpr() {
        let mut dispatcher = dispatcher_with(Arc::new(MockProvider::new(vec![])));
        let result = dispatcher.dispatch("/task (list 1 2)").await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert_eq!(result.content, "[1,2]");
    }

    #[tokio::test]
    async fn test_dispatch_environment_persists_across_calls() {
        let mut dispatcher = dispatcher_with(Arc::new(MockProvider::new(vec![])));
        dispatcher.dispatch("(define x 41)").await;
        let result = dispatcher.dispatch("(+ x 1)").await;

        assert_eq!(result.content, "42");
    }

    #[tokio::test]
    async fn test_dispatch_routes_direct_task_to_programmatic() {
        let mut dispatcher = dispatcher_with(Arc::new(MockProvider::new(vec![])));
        dispatcher.task_system().register_programmatic_executor(Arc::new(EchoExecutor));

        let result = dispatcher
            .dispatch(r#"/task aider:automatic prompt="add docstring" file_context=["/a.py"]"#)
            .await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert!(result.content.contains("add docstring"));
        assert!(result.content.contains("/a.py"));
        assert_eq!(result.notes.template_used.as_deref(), Some("aider:automatic"));
        assert_eq!(result.notes.extra["turns_used"], 0);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command() {
        let mut dispatcher = dispatcher_with(Arc::new(MockProvider::new(vec![])));
        let result = dispatcher.dispatch("/frobnicate now").await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error().unwrap().reason(), Some(FailureReason::UnknownCommand));
    }

    #[tokio::test]
    async fn test_dispatch_free_text_goes_to_chat() {
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text("hello!")]));
        let mut dispatcher = dispatcher_with(provider);

        let result = dispatcher.dispatch("hi there").await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert_eq!(result.content, "hello!");
        assert_eq!(dispatcher.chat_mut().history().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_plan_mode() {
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text("<plan>do it</plan>")]));
        let mut dispatcher = dispatcher_with(provider.clone());

        let result = dispatcher.dispatch("/plan refactor everything").await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert!(provider.requests()[0].messages[0].content.contains("<plan>"));
    }

    #[tokio::test]
    async fn test_chat_subtask_tool_is_orchestrated() {
        use crate::llm::ToolCall;

        let provider = Arc::new(MockProvider::new(vec![
            ProviderResponse::tool_use(
                None,
                vec![ToolCall::new("aider:automatic", serde_json::json!({"prompt": "fix"}))],
            ),
            ProviderResponse::text("all fixed"),
        ]));
        let mut dispatcher = dispatcher_with(provider.clone());
        dispatcher.task_system().register_programmatic_executor(Arc::new(EchoExecutor));
        dispatcher.chat_mut().register_subtask_tool("aider:automatic", vec!["aider".to_string()]);

        let result = dispatcher.dispatch("please fix the bug").await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert_eq!(result.content, "all fixed");
        // The subtask's echoed result rode back as a tool message
        let last_request = provider.requests().last().unwrap().clone();
        assert!(last_request.messages.iter().any(|m| m.content.contains("fix")));
    }
}

//! End-to-end tests for the taskweave runtime
//!
//! Drives the real dispatcher, task system, handler, and evaluator against a
//! scripted provider. No network, no model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value as Json;

use taskweave::llm::mock::MockProvider;
use taskweave::llm::{ProviderResponse, ToolCall};
use taskweave::task::{ProgrammaticExecutor, SharedServices};
use taskweave::tools::{DirectTool, ToolContext, ToolOutcome};
use taskweave::{
    Config, Dispatcher, FailureReason, MemorySystem, OutputFormat, SubtaskRequest, TaskError, TaskResult, TaskStatus,
    TaskSystem, TemplateDefinition,
};

fn dispatcher_with(provider: Arc<MockProvider>, config: Config) -> Dispatcher {
    Dispatcher::new(provider, config, std::env::temp_dir()).unwrap()
}

fn template(name: &str, subtype: &str) -> TemplateDefinition {
    TemplateDefinition {
        name: name.to_string(),
        template_type: "atomic".to_string(),
        subtype: subtype.to_string(),
        description: String::new(),
        params: vec!["prompt".to_string()],
        system_prompt: String::new(),
        instructions: "{{prompt}}".to_string(),
        output_format: None,
        context_management: Some(taskweave::ContextManagement {
            fresh_context: Some(false),
            ..Default::default()
        }),
        file_paths: None,
        tools: vec![],
    }
}

/// Scenario 1: direct atomic invocation through a programmatic executor
mod scenario_programmatic {
    use super::*;

    struct AiderEcho;

    #[async_trait]
    impl ProgrammaticExecutor for AiderEcho {
        fn name(&self) -> &str {
            "aider:automatic"
        }

        async fn execute(&self, inputs: &BTreeMap<String, Json>, _services: &SharedServices) -> TaskResult {
            TaskResult::complete(
                serde_json::json!({
                    "prompt": inputs.get("prompt"),
                    "files": inputs.get("file_context"),
                })
                .to_string(),
            )
        }
    }

    #[tokio::test]
    async fn test_direct_atomic_via_programmatic_executor() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut dispatcher = dispatcher_with(provider.clone(), Config::default());
        dispatcher.task_system().register_programmatic_executor(Arc::new(AiderEcho));

        let result = dispatcher
            .dispatch(r#"/task aider:automatic prompt="add docstring" file_context=["/a.py"]"#)
            .await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert!(result.content.contains("add docstring"));
        assert!(result.content.contains("/a.py"));
        assert_eq!(result.notes.template_used.as_deref(), Some("aider:automatic"));
        assert_eq!(result.notes.extra["turns_used"], 0);
        // No model involvement at all
        assert_eq!(provider.call_count(), 0);
    }
}

/// Scenario 2: bind and map over a direct tool
mod scenario_bind_map {
    use super::*;

    struct FakeReadFile;

    #[async_trait]
    impl DirectTool for FakeReadFile {
        fn name(&self) -> &'static str {
            "read_file"
        }

        fn description(&self) -> &'static str {
            "test double"
        }

        fn input_schema(&self) -> Json {
            serde_json::json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            })
        }

        async fn execute(&self, input: Json, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::success(format!("contents of {}", input["path"].as_str().unwrap_or("?")))
        }
    }

    #[tokio::test]
    async fn test_sexpr_bind_and_map() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut dispatcher = dispatcher_with(provider, Config::default());
        dispatcher.evaluator_mut().register_tool(Arc::new(FakeReadFile));

        let result = dispatcher
            .dispatch(r#"(bind xs (list "a.py" "b.py") (map (lambda (f) (call read_file f)) xs))"#)
            .await;

        assert_eq!(result.status, TaskStatus::Complete);
        let parsed = result.parsed_content.expect("list result is structured");
        assert_eq!(parsed, serde_json::json!(["contents of a.py", "contents of b.py"]));
    }
}

/// Scenario 3: multi-step tool use within one chat turn
mod scenario_multistep_chat {
    use super::*;

    struct FakeListPaths;

    #[async_trait]
    impl DirectTool for FakeListPaths {
        fn name(&self) -> &'static str {
            "list_paths"
        }

        fn description(&self) -> &'static str {
            "test double"
        }

        fn input_schema(&self) -> Json {
            serde_json::json!({
                "type": "object",
                "properties": {"pattern": {"type": "string"}},
                "required": ["pattern"]
            })
        }

        async fn execute(&self, _input: Json, _ctx: &ToolContext) -> ToolOutcome {
            ToolOutcome::success(r#"["/auth.py"]"#)
        }
    }

    struct AiderOk;

    #[async_trait]
    impl ProgrammaticExecutor for AiderOk {
        fn name(&self) -> &str {
            "aider:automatic"
        }

        async fn execute(&self, _inputs: &BTreeMap<String, Json>, _services: &SharedServices) -> TaskResult {
            TaskResult::complete("ok")
        }
    }

    #[tokio::test]
    async fn test_multi_step_tool_use_in_chat() {
        let provider = Arc::new(MockProvider::new(vec![
            ProviderResponse::tool_use(
                None,
                vec![ToolCall::new("list_paths", serde_json::json!({"pattern": "*auth*.py"}))],
            ),
            ProviderResponse::tool_use(
                None,
                vec![ToolCall::new(
                    "aider:automatic",
                    serde_json::json!({"prompt": "edit the first", "files": ["/auth.py"]}),
                )],
            ),
            ProviderResponse::text("done"),
        ]));

        let mut dispatcher = dispatcher_with(provider.clone(), Config::default());
        dispatcher.task_system().register_programmatic_executor(Arc::new(AiderOk));
        dispatcher.chat_mut().register_direct_tool(Arc::new(FakeListPaths));
        dispatcher
            .chat_mut()
            .register_subtask_tool("aider:automatic", vec!["aider".to_string()]);

        let result = dispatcher
            .dispatch("List *.py files about auth, then edit the first.")
            .await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert_eq!(result.content, "done");

        // user, assistant+call, tool, assistant+call, tool, final assistant
        let history = dispatcher.chat_mut().history();
        assert_eq!(history.len(), 6);
        assert_eq!(history.messages().last().unwrap().content, "done");

        let metrics = dispatcher.chat_mut().get_resource_metrics();
        assert_eq!(metrics.turns.used, 3);

        // The subtask result was injected before the final model call
        let last_request = provider.requests().last().unwrap().clone();
        assert!(last_request.messages.iter().any(|m| m.content == "ok"));
    }
}

/// Scenario 4: declared output format rejected
mod scenario_output_format {
    use super::*;

    #[tokio::test]
    async fn test_output_format_failure_preserves_content() {
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text(r#"{"x":1}"#)]));
        let mut dispatcher = dispatcher_with(provider, Config::default());

        let mut needs_array = template("extract_list", "extract");
        needs_array.output_format = Some(OutputFormat::json_with_schema("array"));
        dispatcher.task_system().register_template(needs_array).unwrap();

        let result = dispatcher.dispatch(r#"/task extract_list prompt="list them""#).await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.content, r#"{"x":1}"#);
        match result.error().unwrap() {
            TaskError::TaskFailure { reason, details, .. } => {
                assert_eq!(*reason, FailureReason::OutputFormatFailure);
                let details = details.as_ref().unwrap();
                assert_eq!(details["expectedType"], "array");
                assert_eq!(details["actualType"], "object");
            }
            other => panic!("expected task failure, got {:?}", other),
        }
    }
}

/// Scenario 5: context retrieval returns paths, never contents
mod scenario_context_retrieval {
    use super::*;
    use taskweave::ContextGenerationInput;

    #[tokio::test]
    async fn test_get_relevant_context_for() {
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text(
            r#"[{"path": "auth.py", "relevance": "login flow", "score": 0.9}]"#,
        )]));

        let memory = Arc::new(MemorySystem::new());
        let _system = TaskSystem::bootstrap(provider.clone(), Config::default(), memory.clone(), std::env::temp_dir())
            .unwrap();

        let mut index = fileindex::GlobalIndex::new();
        index.insert("/repo/cache.rs", "rust module, lru cache");
        index.insert("/repo/auth.py", "python module, auth login");
        index.insert("/repo/parse.rs", "rust module, parser");
        memory.update_global_index(index);

        let result = memory
            .get_relevant_context_for(&ContextGenerationInput::from_query("authentication logic"))
            .await
            .unwrap();

        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].path.to_str(), Some("auth.py"));
        assert_eq!(result.matches[0].relevance.as_deref(), Some("login flow"));
        assert!((result.matches[0].score - 0.9).abs() < f64::EPSILON);
        // Exactly one matching execution, and no file contents anywhere
        assert_eq!(provider.call_count(), 1);
        assert!(!result.context.contains("lru"));
    }
}

/// Scenario 6: the tool budget bounds a runaway tool loop
mod scenario_tool_budget {
    use super::*;

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DirectTool for CountingTool {
        fn name(&self) -> &'static str {
            "read_file"
        }

        fn description(&self) -> &'static str {
            "test double"
        }

        fn input_schema(&self) -> Json {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _input: Json, _ctx: &ToolContext) -> ToolOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ToolOutcome::success("data")
        }
    }

    #[tokio::test]
    async fn test_runaway_tool_loop_hits_budget() {
        // The mock replays its last response forever: an endless tool call
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::tool_use(
            None,
            vec![ToolCall::new("read_file", serde_json::json!({"path": "x"}))],
        )]));

        let mut config = Config::default();
        config.limits.max_tool_calls_per_turn = 2;
        let mut dispatcher = dispatcher_with(provider, config);

        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher
            .chat_mut()
            .register_direct_tool(Arc::new(CountingTool { calls: calls.clone() }));

        let result = dispatcher.dispatch("loop forever").await;

        assert_eq!(result.status, TaskStatus::Failed);
        match result.error().unwrap() {
            TaskError::ResourceExhaustion { resource, reason, .. } => {
                assert_eq!(resource.to_string(), "turns");
                assert_eq!(reason.as_deref(), Some("tool_budget_exceeded"));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        // Tool executions stayed within the budget
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The working history was discarded: conversation unchanged
        assert!(dispatcher.chat_mut().history().is_empty());
    }
}

/// Cross-cutting invariants
mod invariants {
    use super::*;

    #[tokio::test]
    async fn test_context_enforcement_blocks_dispatch() {
        // 40-token window, 0.8 fraction → 32-token budget
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text("unreachable")]).with_context_window(40));
        let mut dispatcher = dispatcher_with(provider.clone(), Config::default());

        let result = dispatcher.dispatch(&"long input ".repeat(100)).await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.error().unwrap().is_resource_exhaustion());
        // The provider never saw a request
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_turn_limit_across_chat_turns() {
        let provider = Arc::new(MockProvider::new(vec![
            ProviderResponse::text("one"),
            ProviderResponse::text("two"),
            ProviderResponse::text("three"),
        ]));
        let mut config = Config::default();
        config.limits.max_turns = 2;
        let mut dispatcher = dispatcher_with(provider, config);

        assert_eq!(dispatcher.dispatch("a").await.status, TaskStatus::Complete);
        assert_eq!(dispatcher.dispatch("b").await.status, TaskStatus::Complete);

        let third = dispatcher.dispatch("c").await;
        assert_eq!(third.status, TaskStatus::Failed);
        assert!(third.error().unwrap().is_resource_exhaustion());
    }

    struct Chain {
        index: usize,
    }

    #[async_trait]
    impl ProgrammaticExecutor for Chain {
        fn name(&self) -> &str {
            match self.index {
                0 => "chain0",
                1 => "chain1",
                2 => "chain2",
                3 => "chain3",
                _ => "chain4",
            }
        }

        async fn execute(&self, _inputs: &BTreeMap<String, Json>, _services: &SharedServices) -> TaskResult {
            let next = format!("chain{}", self.index + 1);
            TaskResult::continuation(SubtaskRequest::by_name(next), String::new())
        }
    }

    #[tokio::test]
    async fn test_continuation_depth_bound() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut config = Config::default();
        config.limits.max_subtask_depth = 2;
        let dispatcher = dispatcher_with(provider, config);

        for index in 0..5 {
            dispatcher
                .task_system()
                .register_programmatic_executor(Arc::new(Chain { index }));
        }

        let result = dispatcher
            .task_system()
            .execute_atomic_template(&SubtaskRequest::by_name("chain0"))
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error().unwrap().reason(), Some(FailureReason::DepthExceeded));
    }

    #[tokio::test]
    async fn test_continuation_cycle_detected() {
        struct SelfLoop;

        #[async_trait]
        impl ProgrammaticExecutor for SelfLoop {
            fn name(&self) -> &str {
                "ouroboros"
            }

            async fn execute(&self, _inputs: &BTreeMap<String, Json>, _services: &SharedServices) -> TaskResult {
                TaskResult::continuation(SubtaskRequest::by_name("ouroboros"), String::new())
            }
        }

        let provider = Arc::new(MockProvider::new(vec![]));
        let dispatcher = dispatcher_with(provider, Config::default());
        dispatcher.task_system().register_programmatic_executor(Arc::new(SelfLoop));

        let result = dispatcher
            .task_system()
            .execute_atomic_template(&SubtaskRequest::by_name("ouroboros"))
            .await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error().unwrap().reason(), Some(FailureReason::CycleDetected));
    }

    #[tokio::test]
    async fn test_matching_never_recurses() {
        use taskweave::ContextGenerationInput;

        // Even when the matching reply is itself oddly shaped, only one
        // nested execution of the matching template may happen
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text("[]")]));
        let memory = Arc::new(MemorySystem::new());
        let _system = TaskSystem::bootstrap(provider.clone(), Config::default(), memory.clone(), std::env::temp_dir())
            .unwrap();

        let mut index = fileindex::GlobalIndex::new();
        index.insert("/repo/a.py", "auth");
        memory.update_global_index(index);

        let result = memory
            .get_relevant_context_for(&ContextGenerationInput::from_query("auth"))
            .await
            .unwrap();

        assert!(result.matches.is_empty());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_evaluator_and_chat_share_exit_codes() {
        let provider = Arc::new(MockProvider::new(vec![]));
        let mut dispatcher = dispatcher_with(provider, Config::default());

        let failure = dispatcher.dispatch("/task missing_template").await;
        assert_eq!(failure.error().unwrap().exit_code(), 1);

        let mut config = Config::default();
        config.limits.max_turns = 0;
        let provider = Arc::new(MockProvider::new(vec![ProviderResponse::text("x")]));
        let mut exhausted_dispatcher = dispatcher_with(provider, config);
        let exhausted = exhausted_dispatcher.dispatch("hello").await;
        assert_eq!(exhausted.error().unwrap().exit_code(), 2);
    }
}

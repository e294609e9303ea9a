//! Taskweave - LLM task-orchestration runtime
//!
//! A user issues a chat turn, an atomic template invocation, or a workflow
//! expression in a small Lisp-like DSL; the runtime routes it to the right
//! executor and accounts for every resource it spends.
//!
//! # Modules
//!
//! - [`dispatcher`] - routes external requests to chat, task, or evaluator
//! - [`handler`] - conversation session with the multi-step tool loop
//! - [`task`] - template registry, atomic executor, context resolution
//! - [`memory`] - global file index and associative context retrieval
//! - [`sexpr`] - workflow DSL: parser, environments, evaluator
//! - [`tools`] - direct and subtask tools under one interface
//! - [`llm`] - provider abstraction and the Anthropic adapter
//! - [`domain`] - result envelope, error taxonomy, request types
//! - [`repl`] - interactive shell
//! - [`config`] - YAML configuration with fallback chain

pub mod cancel;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod handler;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod repl;
pub mod sexpr;
pub mod task;
pub mod tools;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::{Config, LimitsConfig, LlmConfig};
pub use dispatcher::Dispatcher;
pub use domain::{
    AssociativeMatchResult, ContextGenerationInput, ContextManagement, FailureReason, FileMatch, InheritMode,
    ResourceKind, SubtaskRequest, TaskError, TaskNotes, TaskResult, TaskStatus,
};
pub use handler::{ConversationHistory, Handler, PromptSpec, ResourceMetrics};
pub use llm::{AnthropicProvider, ChatMessage, ModelProvider, ProviderError, ProviderRequest, ProviderResponse, Role, StopReason, ToolCall, ToolDefinition, create_provider};
pub use memory::MemorySystem;
pub use sexpr::{Environment, Evaluator, Sexpr, SexpSyntaxError, Value};
pub use task::{
    CallStack, OutputFormat, ProgrammaticExecutor, SharedServices, TaskSystem, TemplateDefinition, TemplateRegistry,
};
pub use tools::{DirectTool, RegisteredTool, ToolContext, ToolOutcome, ToolRegistry};

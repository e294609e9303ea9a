//! Task System
//!
//! Template registry, dispatch (programmatic executors first, then atomic
//! templates), context resolution, and the metacircular matcher the Memory
//! System delegates to.

mod context;
mod executor;
mod matching;
mod programmatic;
mod registry;
mod template;

pub use context::{ResolvedContext, resolve_context};
pub use executor::{execute_body, substitute, validate_output};
pub use matching::{MATCH_THRESHOLD, parse_match_array, score_similarity};
pub use programmatic::{ProgrammaticExecutor, SharedServices, ShellCommandExecutor};
pub use registry::TemplateRegistry;
pub use template::{OutputFormat, TemplateDefinition};

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tracing::debug;

use fileindex::GlobalIndex;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::domain::{
    AssociativeMatchResult, ContextGenerationInput, FailureReason, SubtaskRequest, TaskError, TaskResult, TaskStatus,
};
use crate::handler::Handler;
use crate::llm::ModelProvider;
use crate::memory::MemorySystem;
use crate::prompts;
use crate::tools::ToolRegistry;
use crate::tools::builtin::{GetContextTool, ListPathsTool, ReadFileTool, RunScriptTool};

/// Active atomic executions, for depth and cycle enforcement
///
/// The first frame is the top-level execution (depth 0); each resolved
/// CONTINUATION adds a nested frame. Entering a frame whose identifier is
/// already active is a cycle; entering past `max_depth` nested frames fails
/// at exactly depth + 1.
#[derive(Debug)]
pub struct CallStack {
    active: Vec<String>,
    max_depth: u32,
}

impl CallStack {
    pub fn new(max_depth: u32) -> Self {
        Self {
            active: Vec::new(),
            max_depth,
        }
    }

    /// Nested depth of the innermost frame (top level is 0)
    pub fn depth(&self) -> usize {
        self.active.len().saturating_sub(1)
    }

    fn enter(&mut self, identifier: &str) -> Result<(), TaskError> {
        if self.active.iter().any(|name| name == identifier) {
            return Err(TaskError::failure(
                FailureReason::CycleDetected,
                format!("'{}' is already on the active call stack", identifier),
            ));
        }
        if self.active.len() > self.max_depth as usize {
            return Err(TaskError::failure(
                FailureReason::DepthExceeded,
                format!("subtask depth exceeded {} at '{}'", self.max_depth, identifier),
            ));
        }
        self.active.push(identifier.to_string());
        Ok(())
    }

    fn leave(&mut self) {
        self.active.pop();
    }
}

/// Wrap a failed nested execution, letting structural errors through intact
///
/// Depth, cycle, cancellation, and resource errors keep their identity so
/// callers can observe them; everything else becomes `subtask_failure`.
fn subtask_failure(subtask: &SubtaskRequest, sub_result: TaskResult) -> TaskResult {
    let passthrough = match sub_result.error() {
        Some(err) if err.is_resource_exhaustion() => true,
        Some(err) => matches!(
            err.reason(),
            Some(FailureReason::CycleDetected) | Some(FailureReason::DepthExceeded) | Some(FailureReason::Cancelled)
        ),
        None => false,
    };
    if passthrough {
        return sub_result;
    }

    let cause = sub_result
        .error()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "subtask did not complete".to_string());
    TaskResult::failed_with_content(
        TaskError::failure_with(
            FailureReason::SubtaskFailure,
            format!("subtask '{}' failed: {}", subtask.identifier(), cause),
            serde_json::json!({"subtask": subtask.identifier()}),
        ),
        sub_result.content,
    )
}

/// Template registry plus dispatch and context plumbing
pub struct TaskSystem {
    registry: RwLock<TemplateRegistry>,
    programmatic: RwLock<HashMap<String, Arc<dyn ProgrammaticExecutor>>>,
    provider: Arc<dyn ModelProvider>,
    config: Config,
    memory: Arc<MemorySystem>,
    root: PathBuf,
}

impl TaskSystem {
    pub fn new(provider: Arc<dyn ModelProvider>, config: Config, memory: Arc<MemorySystem>, root: PathBuf) -> Self {
        Self {
            registry: RwLock::new(TemplateRegistry::new()),
            programmatic: RwLock::new(HashMap::new()),
            provider,
            config,
            memory,
            root,
        }
    }

    /// Create and wire a fully initialised Task System
    ///
    /// Attaches the metacircular memory link, registers builtin templates
    /// and programmatic executors, and loads any configured template pack.
    pub fn bootstrap(
        provider: Arc<dyn ModelProvider>,
        config: Config,
        memory: Arc<MemorySystem>,
        root: PathBuf,
    ) -> Result<Arc<Self>, TaskError> {
        let templates_dir = config.templates_dir.clone();
        let system = Arc::new(Self::new(provider, config, memory.clone(), root));
        memory.attach_task_system(Arc::downgrade(&system));

        for template in prompts::builtin_templates() {
            system.register_template(template)?;
        }
        system.register_programmatic_executor(Arc::new(ShellCommandExecutor));

        if let Some(dir) = templates_dir {
            for template in prompts::load_template_pack(&dir)? {
                system.register_template(template)?;
            }
        }
        Ok(system)
    }

    /// Register an atomic template; immutable once stored
    pub fn register_template(&self, template: TemplateDefinition) -> Result<(), TaskError> {
        self.registry.write().expect("registry lock poisoned").register(template)
    }

    /// Register a native executor taking precedence over templates
    pub fn register_programmatic_executor(&self, executor: Arc<dyn ProgrammaticExecutor>) {
        let name = executor.name().to_string();
        debug!(%name, "TaskSystem::register_programmatic_executor: called");
        self.programmatic
            .write()
            .expect("programmatic lock poisoned")
            .insert(name, executor);
    }

    /// Look up a template by name, then by `type:subtype` alias
    pub fn find_template(&self, identifier: &str) -> Option<Arc<TemplateDefinition>> {
        self.registry.read().expect("registry lock poisoned").find(identifier)
    }

    /// Rank atomic templates against a text by description similarity
    ///
    /// Lowercase word-set Jaccard; scores at or below the threshold drop
    /// out; ties keep registration order.
    pub fn find_matching_tasks(&self, text: &str) -> Vec<(Arc<TemplateDefinition>, f64)> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let mut ranked: Vec<(Arc<TemplateDefinition>, f64)> = registry
            .iter()
            .map(|template| {
                let score = score_similarity(text, &template.description);
                (template, score)
            })
            .filter(|(_, score)| *score > MATCH_THRESHOLD)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Execute an atomic request with a fresh call stack
    pub async fn execute_atomic_template(&self, request: &SubtaskRequest) -> TaskResult {
        let mut stack = CallStack::new(self.config.limits.max_subtask_depth);
        self.execute_atomic_in_stack(request, &mut stack).await
    }

    /// Execute an atomic request inside an existing call stack
    ///
    /// The evaluator threads its per-evaluation stack through here so that
    /// CONTINUATION chains share one depth budget.
    pub fn execute_atomic_in_stack<'a>(
        &'a self,
        request: &'a SubtaskRequest,
        stack: &'a mut CallStack,
    ) -> BoxFuture<'a, TaskResult> {
        Box::pin(async move {
            if let Err(err) = request.validate() {
                return TaskResult::failed(err);
            }
            let identifier = request.identifier();
            debug!(%identifier, depth = stack.depth(), "TaskSystem::execute_atomic_in_stack: called");

            // 1. Programmatic executors take precedence
            if let Some(executor) = self.find_programmatic(request) {
                if let Err(err) = stack.enter(&identifier) {
                    return TaskResult::failed(err);
                }
                let services = SharedServices {
                    root: self.root.clone(),
                    cancel: CancelToken::new(),
                };
                let mut result = executor.execute(&request.inputs, &services).await;

                // Follow any continuation chain while this frame is active so
                // depth and cycle checks see the whole chain
                while result.status == TaskStatus::Continuation {
                    let Some(subtask) = result.notes.subtask_request.clone() else {
                        result = TaskResult::failed(TaskError::failure(
                            FailureReason::SubtaskFailure,
                            "continuation carried no subtask request",
                        ));
                        break;
                    };
                    if let Err(err) = subtask.validate() {
                        result = TaskResult::failed(err);
                        break;
                    }
                    let sub_result = self.execute_atomic_in_stack(&subtask, stack).await;
                    if sub_result.status == TaskStatus::Failed {
                        result = subtask_failure(&subtask, sub_result);
                        break;
                    }
                    result = sub_result;
                }
                stack.leave();

                if result.notes.template_used.is_none() {
                    result.notes.template_used = Some(identifier);
                }
                result.notes.set_extra("turns_used", serde_json::json!(0));
                return result;
            }

            // 2. Template by name, then by type:subtype alias, then hints
            let template = request
                .name
                .as_deref()
                .and_then(|name| self.find_template(name))
                .or_else(|| {
                    request
                        .subtype
                        .as_ref()
                        .and_then(|subtype| self.find_template(&format!("{}:{}", request.task_type, subtype)))
                })
                .or_else(|| {
                    request
                        .template_hints
                        .iter()
                        .find_map(|hint| self.find_template(hint))
                });
            let Some(template) = template else {
                return TaskResult::failed(TaskError::failure(
                    FailureReason::TemplateNotFound,
                    format!("no template for '{}'", identifier),
                ));
            };

            if let Err(err) = stack.enter(&template.name) {
                return TaskResult::failed(err);
            }
            let result = self.execute_template_frame(&template, request, stack).await;
            stack.leave();
            result
        })
    }

    /// One template execution frame: context, handler, CONTINUATION chain
    async fn execute_template_frame(
        &self,
        template: &TemplateDefinition,
        request: &SubtaskRequest,
        stack: &mut CallStack,
    ) -> TaskResult {
        let context = match resolve_context(request, template, &self.memory).await {
            Ok(context) => context,
            Err(err) => {
                let mut result = TaskResult::failed(err);
                result.notes.template_used = Some(template.name.clone());
                return result;
            }
        };

        let mut handler = self.make_handler();
        let mut result = execute_body(template, &request.inputs, &mut handler, &context).await;

        // Resolve nested subtask requests until the turn settles
        while result.status == TaskStatus::Continuation {
            let Some(subtask) = result.notes.subtask_request.clone() else {
                result = TaskResult::failed(TaskError::failure(
                    FailureReason::SubtaskFailure,
                    "continuation carried no subtask request",
                ));
                break;
            };
            if let Err(err) = subtask.validate() {
                result = TaskResult::failed(err);
                break;
            }

            let sub_result = self.execute_atomic_in_stack(&subtask, stack).await;
            if sub_result.status != TaskStatus::Complete {
                result = subtask_failure(&subtask, sub_result);
                break;
            }

            if let Err(err) = handler.add_tool_response(&subtask.identifier(), sub_result.content) {
                result = TaskResult::failed(err);
                break;
            }
            result = validate_output(template, handler.resume().await);
        }

        result.notes.template_used = Some(template.name.clone());
        result.notes.context_source = Some(context.source.clone());
        result.notes.context_files_count = Some(context.included_files.len());
        let metrics = handler.get_resource_metrics();
        result
            .notes
            .set_extra("turns_used", serde_json::json!(metrics.turns.used));
        result
    }

    /// Execute the associative-matching template for the Memory System
    ///
    /// Runs on a dedicated Handler so no conversation history is polluted,
    /// and skips context resolution entirely so matching can never recurse
    /// into retrieval.
    pub async fn generate_context_for_memory_system(
        &self,
        input: &ContextGenerationInput,
        index: &GlobalIndex,
    ) -> Result<AssociativeMatchResult, TaskError> {
        input.validate()?;
        let template = self
            .find_template(prompts::ASSOCIATIVE_MATCHING_ALIAS)
            .ok_or_else(|| {
                TaskError::failure(
                    FailureReason::TemplateNotFound,
                    "associative matching template is not registered",
                )
            })?;

        let query = input.effective_query();
        let mut params: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        params.insert("global_index".to_string(), serde_json::json!(index.format_for_matching()));
        params.insert("context_input".to_string(), serde_json::json!(query));

        let mut handler = self.make_handler();
        let result = execute_body(&template, &params, &mut handler, &ResolvedContext::none()).await;

        match result.status {
            TaskStatus::Complete => {
                let parsed = result.parsed_content.ok_or_else(|| {
                    TaskError::failure(FailureReason::OutputFormatFailure, "matching reply had no parsed payload")
                })?;
                let matches = parse_match_array(&parsed)?;
                debug!(count = matches.len(), "generate_context_for_memory_system: matched");
                Ok(AssociativeMatchResult {
                    context: format!("associative match for: {}", query),
                    matches,
                })
            }
            _ => Err(result.notes.error.clone().unwrap_or_else(|| {
                TaskError::failure(
                    FailureReason::ContextRetrievalFailure,
                    "associative matching did not complete",
                )
            })),
        }
    }

    /// Fresh Handler with the builtin direct tools
    pub fn make_handler(&self) -> Handler {
        let mut registry = ToolRegistry::new();
        registry.register_direct(Arc::new(ReadFileTool));
        registry.register_direct(Arc::new(ListPathsTool));
        registry.register_direct(Arc::new(RunScriptTool));
        registry.register_direct(Arc::new(GetContextTool::new(self.memory.clone())));
        Handler::new(
            self.provider.clone(),
            &self.config,
            registry,
            prompts::BASE_SYSTEM_PROMPT,
            self.root.clone(),
        )
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// True when a programmatic executor is registered under `identifier`
    pub fn has_programmatic(&self, identifier: &str) -> bool {
        self.programmatic
            .read()
            .expect("programmatic lock poisoned")
            .contains_key(identifier)
    }

    fn find_programmatic(&self, request: &SubtaskRequest) -> Option<Arc<dyn ProgrammaticExecutor>> {
        let table = self.programmatic.read().expect("programmatic lock poisoned");
        if let Some(name) = request.name.as_deref() {
            if let Some(executor) = table.get(name) {
                return Some(executor.clone());
            }
        }
        if let Some(subtype) = request.subtype.as_ref() {
            if let Some(executor) = table.get(&format!("{}:{}", request.task_type, subtype)) {
                return Some(executor.clone());
            }
        }
        None
    }
}

//! S-expression evaluator
//!
//! Lexical scoping, applicative-order calls, special forms, and dispatch of
//! registered templates/tools through the Task System. One `CallStack` per
//! evaluation bounds CONTINUATION depth and detects cycles.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value as Json;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::domain::{
    ContextGenerationInput, ContextManagement, FailureReason, InheritMode, SubtaskRequest, TaskError, TaskResult,
    TaskStatus,
};
use crate::memory::MemorySystem;
use crate::task::{CallStack, TaskSystem};
use crate::tools::builtin::{GetContextTool, ListPathsTool, ReadFileTool, RunScriptTool};
use crate::tools::{DirectTool, RegisteredTool, ToolContext, ToolRegistry};

use super::ast::Sexpr;
use super::env::Environment;
use super::parser::parse_many;
use super::primitives;
use super::value::{Closure, Value};

/// Special forms never subject to argument pre-evaluation
const SPECIAL_FORMS: &[&str] = &[
    "quote", "if", "let", "bind", "define", "lambda", "loop", "and", "or", "map", "get_context", "call",
];

fn invalid(message: impl Into<String>) -> TaskError {
    TaskError::failure(FailureReason::InvalidInput, message)
}

/// Workflow-DSL evaluator
pub struct Evaluator {
    task_system: Arc<TaskSystem>,
    memory: Arc<MemorySystem>,
    tools: ToolRegistry,
    tool_ctx: ToolContext,
    cancel: CancelToken,
}

impl Evaluator {
    pub fn new(task_system: Arc<TaskSystem>, memory: Arc<MemorySystem>) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register_direct(Arc::new(ReadFileTool));
        tools.register_direct(Arc::new(ListPathsTool));
        tools.register_direct(Arc::new(RunScriptTool));
        tools.register_direct(Arc::new(GetContextTool::new(memory.clone())));

        let cancel = CancelToken::new();
        let tool_ctx = ToolContext::new(task_system.root().to_path_buf(), "evaluator").with_cancel(cancel.clone());

        Self {
            task_system,
            memory,
            tools,
            tool_ctx,
            cancel,
        }
    }

    /// Make an additional direct tool callable from workflows
    pub fn register_tool(&mut self, tool: Arc<dyn DirectTool>) {
        self.tools.register_direct(tool);
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Evaluate a source program; the value of the last form wins
    pub async fn run(&self, source: &str, env: &Arc<Environment>) -> TaskResult {
        let forms = match parse_many(source) {
            Ok(forms) => forms,
            Err(e) => return TaskResult::failed(invalid(e.to_string())),
        };
        if forms.is_empty() {
            return TaskResult::failed(invalid("empty program"));
        }

        let mut stack = CallStack::new(self.task_system.config().limits.max_subtask_depth);
        let mut value = Value::Nil;
        for form in forms {
            if let Err(err) = self.cancel.check() {
                return TaskResult::failed(err);
            }
            match self.eval_in(form, env.clone(), &mut stack).await {
                Ok(v) => value = v,
                Err(err) => return TaskResult::failed(err),
            }
        }

        let mut result = TaskResult::complete(value.to_string());
        if !matches!(value, Value::Str(_)) {
            result.parsed_content = Some(value.to_json());
        }
        result
    }

    /// Evaluate one already parsed node with a fresh call stack
    pub async fn eval(&self, node: Sexpr, env: &Arc<Environment>) -> Result<Value, TaskError> {
        let mut stack = CallStack::new(self.task_system.config().limits.max_subtask_depth);
        self.eval_in(node, env.clone(), &mut stack).await
    }

    fn eval_in<'a>(
        &'a self,
        node: Sexpr,
        env: Arc<Environment>,
        stack: &'a mut CallStack,
    ) -> BoxFuture<'a, Result<Value, TaskError>> {
        Box::pin(async move {
            self.cancel.check()?;
            match node {
                Sexpr::Int(n) => Ok(Value::Int(n)),
                Sexpr::Float(x) => Ok(Value::Float(x)),
                Sexpr::Bool(b) => Ok(Value::Bool(b)),
                Sexpr::Nil => Ok(Value::Nil),
                Sexpr::Str(s) => Ok(Value::Str(s)),
                Sexpr::Symbol(name) => self.resolve_symbol(&name, &env),
                Sexpr::List(items) => {
                    if items.is_empty() {
                        return Ok(Value::List(vec![]));
                    }
                    if let Some(form) = items[0].as_symbol() {
                        if SPECIAL_FORMS.contains(&form) {
                            let form = form.to_string();
                            return self.eval_special(&form, &items[1..], env, stack).await;
                        }
                    }
                    self.eval_call_form(items, env, stack).await
                }
            }
        })
    }

    /// A symbol resolves in the environment first, then as a registered
    /// template/tool/executor reference
    fn resolve_symbol(&self, name: &str, env: &Arc<Environment>) -> Result<Value, TaskError> {
        if let Some(value) = env.lookup(name) {
            return Ok(value);
        }
        if self.is_callable_name(name) {
            return Ok(Value::TemplateRef(name.to_string()));
        }
        Err(TaskError::failure(
            FailureReason::UnboundSymbol,
            format!("unbound symbol '{}'", name),
        ))
    }

    fn is_callable_name(&self, name: &str) -> bool {
        self.tools.has_tool(name)
            || self.task_system.find_template(name).is_some()
            || self.task_system.has_programmatic(name)
    }

    async fn eval_special(
        &self,
        form: &str,
        args: &[Sexpr],
        env: Arc<Environment>,
        stack: &mut CallStack,
    ) -> Result<Value, TaskError> {
        match form {
            "quote" => match args {
                [datum] => Ok(Value::from_datum(datum)),
                _ => Err(invalid("quote takes exactly one argument")),
            },
            "if" => {
                let (condition, consequent, alternative) = match args {
                    [c, t] => (c, t, None),
                    [c, t, e] => (c, t, Some(e)),
                    _ => return Err(invalid("if takes a condition and one or two branches")),
                };
                let test = self.eval_in(condition.clone(), env.clone(), &mut *stack).await?;
                if test.is_truthy() {
                    self.eval_in(consequent.clone(), env, stack).await
                } else if let Some(alternative) = alternative {
                    self.eval_in(alternative.clone(), env, stack).await
                } else {
                    Ok(Value::Nil)
                }
            }
            "let" => {
                let [bindings, body @ ..] = args else {
                    return Err(invalid("let takes a binding list and a body"));
                };
                let Sexpr::List(pairs) = bindings else {
                    return Err(invalid("let bindings must be a list"));
                };

                // Each value evaluates in the outer environment
                let mut bound = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    let Sexpr::List(pair_items) = pair else {
                        return Err(invalid("let binding must be (symbol value)"));
                    };
                    let [Sexpr::Symbol(name), value_expr] = pair_items.as_slice() else {
                        return Err(invalid("let binding must be (symbol value)"));
                    };
                    let value = self.eval_in(value_expr.clone(), env.clone(), &mut *stack).await?;
                    bound.push((name.clone(), value));
                }

                let child = Environment::extend(&env, bound);
                self.eval_body(body, child, stack).await
            }
            "bind" => {
                let [Sexpr::Symbol(name), value_expr, body @ ..] = args else {
                    return Err(invalid("bind takes a symbol, a value, and a body"));
                };
                let value = self.eval_in(value_expr.clone(), env.clone(), &mut *stack).await?;
                let child = Environment::extend(&env, vec![(name.clone(), value)]);
                self.eval_body(body, child, stack).await
            }
            "define" => {
                let [Sexpr::Symbol(name), value_expr] = args else {
                    return Err(invalid("define takes a symbol and a value"));
                };
                let value = self.eval_in(value_expr.clone(), env.clone(), &mut *stack).await?;
                env.define(name.clone(), value.clone());
                Ok(value)
            }
            "lambda" => {
                let [params_expr, body @ ..] = args else {
                    return Err(invalid("lambda takes a parameter list and a body"));
                };
                let Sexpr::List(param_items) = params_expr else {
                    return Err(invalid("lambda parameters must be a list"));
                };
                let mut params = Vec::with_capacity(param_items.len());
                for item in param_items {
                    match item.as_symbol() {
                        Some(name) => params.push(name.to_string()),
                        None => return Err(invalid("lambda parameters must be symbols")),
                    }
                }
                if body.is_empty() {
                    return Err(invalid("lambda body is empty"));
                }
                Ok(Value::Closure(Arc::new(Closure {
                    params,
                    body: body.to_vec(),
                    env,
                })))
            }
            "loop" => {
                let [count_expr, body @ ..] = args else {
                    return Err(invalid("loop takes a count and a body"));
                };
                let count = match self.eval_in(count_expr.clone(), env.clone(), &mut *stack).await? {
                    Value::Int(n) if n >= 0 => n,
                    other => {
                        return Err(invalid(format!(
                            "loop count must be a non-negative integer, got {}",
                            other
                        )));
                    }
                };
                let mut value = Value::Nil;
                for _ in 0..count {
                    value = self.eval_body(body, env.clone(), stack).await?;
                }
                Ok(value)
            }
            "and" => {
                let mut value = Value::Bool(true);
                for arg in args {
                    value = self.eval_in(arg.clone(), env.clone(), &mut *stack).await?;
                    if !value.is_truthy() {
                        return Ok(value);
                    }
                }
                Ok(value)
            }
            "or" => {
                let mut value = Value::Bool(false);
                for arg in args {
                    value = self.eval_in(arg.clone(), env.clone(), &mut *stack).await?;
                    if value.is_truthy() {
                        return Ok(value);
                    }
                }
                Ok(value)
            }
            "map" => {
                let [task_expr, list_expr] = args else {
                    return Err(invalid("map takes a task expression and a list expression"));
                };
                let Value::List(items) = self.eval_in(list_expr.clone(), env.clone(), &mut *stack).await? else {
                    return Err(invalid("map expects a list"));
                };

                // Order preserved; the first error halts the iteration
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    let child = Environment::extend(&env, vec![("item".to_string(), item.clone())]);
                    let value = self.eval_in(task_expr.clone(), child, &mut *stack).await?;
                    let value = match value {
                        Value::Closure(closure) => self.apply_closure(&closure, vec![item], stack).await?,
                        other => other,
                    };
                    results.push(value);
                }
                Ok(Value::List(results))
            }
            "get_context" => self.eval_get_context(args, env, stack).await,
            "call" => {
                let [identifier_expr, call_args @ ..] = args else {
                    return Err(invalid("call takes an identifier and arguments"));
                };
                let name = match identifier_expr {
                    Sexpr::Str(s) => s.clone(),
                    Sexpr::Symbol(s) => match env.lookup(s) {
                        Some(Value::Str(bound)) => bound,
                        Some(Value::TemplateRef(bound)) => bound,
                        Some(other) => {
                            return Err(invalid(format!("call identifier resolved to {}", other.type_name())));
                        }
                        None => s.clone(),
                    },
                    expr => match self.eval_in(expr.clone(), env.clone(), &mut *stack).await? {
                        Value::Str(s) | Value::TemplateRef(s) | Value::Symbol(s) => s,
                        other => {
                            return Err(invalid(format!("call identifier resolved to {}", other.type_name())));
                        }
                    },
                };
                self.invoke_callable(&name, call_args, env, stack).await
            }
            _ => Err(invalid(format!("unhandled special form '{}'", form))),
        }
    }

    /// Evaluate body forms sequentially; the last value wins
    async fn eval_body(
        &self,
        body: &[Sexpr],
        env: Arc<Environment>,
        stack: &mut CallStack,
    ) -> Result<Value, TaskError> {
        let mut value = Value::Nil;
        for form in body {
            value = self.eval_in(form.clone(), env.clone(), &mut *stack).await?;
        }
        Ok(value)
    }

    /// `(head arg…)` where head is not a special form
    async fn eval_call_form(
        &self,
        items: Vec<Sexpr>,
        env: Arc<Environment>,
        stack: &mut CallStack,
    ) -> Result<Value, TaskError> {
        let head = &items[0];
        let args = &items[1..];

        // Primitives apply when the head symbol is not shadowed
        if let Some(name) = head.as_symbol() {
            if env.lookup(name).is_none() && primitives::is_primitive(name) {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_in(arg.clone(), env.clone(), &mut *stack).await?);
                }
                return primitives::apply(name, values);
            }
        }

        let head_value = self.eval_in(head.clone(), env.clone(), &mut *stack).await?;
        match head_value {
            Value::Closure(closure) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_in(arg.clone(), env.clone(), &mut *stack).await?);
                }
                self.apply_closure(&closure, values, stack).await
            }
            Value::TemplateRef(name) => self.invoke_callable(&name, args, env, stack).await,
            other => Err(invalid(format!("{} is not callable", other.type_name()))),
        }
    }

    /// Apply a closure: its captured environment extended with parameters,
    /// never the caller's environment
    async fn apply_closure(
        &self,
        closure: &Closure,
        args: Vec<Value>,
        stack: &mut CallStack,
    ) -> Result<Value, TaskError> {
        if args.len() != closure.params.len() {
            return Err(invalid(format!(
                "closure expects {} arguments, got {}",
                closure.params.len(),
                args.len()
            )));
        }
        let bindings = closure.params.iter().cloned().zip(args).collect();
        let env = Environment::extend(&closure.env, bindings);
        self.eval_body(&closure.body, env, stack).await
    }

    /// Invoke a registered tool, template, or programmatic executor
    async fn invoke_callable(
        &self,
        name: &str,
        raw_args: &[Sexpr],
        env: Arc<Environment>,
        stack: &mut CallStack,
    ) -> Result<Value, TaskError> {
        self.cancel.check()?;
        debug!(%name, "Evaluator::invoke_callable: called");

        let template = self.task_system.find_template(name);
        let declared_params: Vec<String> = template.as_ref().map(|t| t.params.clone()).unwrap_or_default();

        // Partition arguments: overrides, named pairs, positional values
        let mut positional: Vec<Value> = Vec::new();
        let mut named: BTreeMap<String, Json> = BTreeMap::new();
        let mut file_paths: Option<Vec<String>> = None;
        let mut context_management: Option<ContextManagement> = None;

        for arg in raw_args {
            if let Sexpr::List(pair) = arg {
                match pair.first().and_then(Sexpr::as_symbol) {
                    Some("files") => {
                        let mut paths = Vec::new();
                        for path_expr in &pair[1..] {
                            match self.eval_in(path_expr.clone(), env.clone(), &mut *stack).await? {
                                Value::Str(path) => paths.push(path),
                                other => {
                                    return Err(invalid(format!("files entries must be strings, got {}", other.type_name())));
                                }
                            }
                        }
                        file_paths = Some(paths);
                        continue;
                    }
                    Some("context") => {
                        context_management = Some(self.parse_context_override(&pair[1..], &env, stack).await?);
                        continue;
                    }
                    Some(key) if pair.len() == 2 && declared_params.iter().any(|p| p == key) => {
                        let value = self.eval_in(pair[1].clone(), env.clone(), &mut *stack).await?;
                        named.insert(key.to_string(), value.to_json());
                        continue;
                    }
                    _ => {}
                }
            }
            positional.push(self.eval_in(arg.clone(), env.clone(), &mut *stack).await?);
        }

        // Direct tools execute synchronously, outside the task system
        if let Some(RegisteredTool::Direct(tool)) = self.tools.get(name).cloned() {
            let input = build_tool_input(&tool, named, positional)?;
            let outcome = tool.execute(input, &self.tool_ctx).await;
            if outcome.is_error {
                return Err(TaskError::failure(FailureReason::ToolError, outcome.content));
            }
            return Ok(Value::Str(outcome.content));
        }

        // Positional args bind to declared parameters in order; named
        // arguments override by name
        let mut request = SubtaskRequest::by_name(name.to_string());
        for (param, value) in declared_params.iter().zip(positional.iter()) {
            request.inputs.insert(param.clone(), value.to_json());
        }
        if declared_params.is_empty() {
            for (i, value) in positional.iter().enumerate() {
                request.inputs.insert(format!("arg{}", i), value.to_json());
            }
        }
        for (key, value) in named {
            request.inputs.insert(key, value);
        }
        request.file_paths = file_paths;
        request.context_management = context_management;

        let result = self.task_system.execute_atomic_in_stack(&request, stack).await;
        self.result_to_value(result, stack).await
    }

    /// Parse `(context (inherit_context full) (fresh_context false) …)`
    async fn parse_context_override(
        &self,
        pairs: &[Sexpr],
        env: &Arc<Environment>,
        stack: &mut CallStack,
    ) -> Result<ContextManagement, TaskError> {
        let mut settings = ContextManagement::default();
        for pair in pairs {
            let Sexpr::List(pair_items) = pair else {
                return Err(invalid("context options must be (key value) pairs"));
            };
            let [Sexpr::Symbol(key), value_expr] = pair_items.as_slice() else {
                return Err(invalid("context options must be (key value) pairs"));
            };
            let value = self.eval_in(value_expr.clone(), env.clone(), &mut *stack).await?;
            match key.as_str() {
                "inherit_context" => {
                    let mode = match &value {
                        Value::Str(s) | Value::Symbol(s) => match s.as_str() {
                            "none" => InheritMode::None,
                            "full" => InheritMode::Full,
                            "subset" => InheritMode::Subset,
                            other => return Err(invalid(format!("unknown inherit_context '{}'", other))),
                        },
                        other => return Err(invalid(format!("inherit_context must be a name, got {}", other.type_name()))),
                    };
                    settings.inherit_context = Some(mode);
                }
                "accumulate_data" => match value {
                    Value::Bool(b) => settings.accumulate_data = Some(b),
                    other => return Err(invalid(format!("accumulate_data must be a boolean, got {}", other.type_name()))),
                },
                "fresh_context" => match value {
                    Value::Bool(b) => settings.fresh_context = Some(b),
                    other => return Err(invalid(format!("fresh_context must be a boolean, got {}", other.type_name()))),
                },
                other => return Err(invalid(format!("unknown context option '{}'", other))),
            }
        }
        Ok(settings)
    }

    /// `(get_context (query "…") (history h) (inputs m))`
    async fn eval_get_context(
        &self,
        args: &[Sexpr],
        env: Arc<Environment>,
        stack: &mut CallStack,
    ) -> Result<Value, TaskError> {
        let mut input = ContextGenerationInput::default();
        for arg in args {
            let Sexpr::List(pair) = arg else {
                return Err(invalid("get_context options must be (key value) pairs"));
            };
            let [Sexpr::Symbol(key), value_expr] = pair.as_slice() else {
                return Err(invalid("get_context options must be (key value) pairs"));
            };
            let value = self.eval_in(value_expr.clone(), env.clone(), &mut *stack).await?;
            match key.as_str() {
                "query" => match value {
                    Value::Str(s) => input.query = Some(s),
                    other => return Err(invalid(format!("query must be a string, got {}", other.type_name()))),
                },
                "history" => match value {
                    Value::Str(s) => input.inherited_context = Some(s),
                    other => return Err(invalid(format!("history must be a string, got {}", other.type_name()))),
                },
                "inputs" => match value.to_json() {
                    Json::Object(object) => {
                        input.inputs = Some(object.into_iter().collect());
                    }
                    other => {
                        let mut map = BTreeMap::new();
                        map.insert("input".to_string(), other);
                        input.inputs = Some(map);
                    }
                },
                other => return Err(invalid(format!("unknown get_context option '{}'", other))),
            }
        }

        let matched = self.memory.get_relevant_context_for(&input).await?;
        Ok(Value::List(
            matched
                .matches
                .into_iter()
                .map(|m| {
                    Value::List(vec![
                        Value::Str(m.path.display().to_string()),
                        m.relevance.map(Value::Str).unwrap_or(Value::Nil),
                        Value::Float(m.score),
                    ])
                })
                .collect(),
        ))
    }

    /// Convert a task result into a DSL value, resolving any CONTINUATION
    /// left for the evaluation layer
    async fn result_to_value(&self, mut result: TaskResult, stack: &mut CallStack) -> Result<Value, TaskError> {
        loop {
            match result.status {
                TaskStatus::Complete | TaskStatus::Partial => {
                    return Ok(match result.parsed_content {
                        Some(ref parsed) => Value::from_json(parsed),
                        None => Value::Str(result.content),
                    });
                }
                TaskStatus::Failed => {
                    return Err(result
                        .notes
                        .error
                        .clone()
                        .unwrap_or_else(|| TaskError::failure(FailureReason::SubtaskFailure, result.content.clone())));
                }
                TaskStatus::Continuation => {
                    let Some(request) = result.notes.subtask_request.clone() else {
                        return Err(TaskError::failure(
                            FailureReason::SubtaskFailure,
                            "continuation carried no subtask request",
                        ));
                    };
                    request.validate()?;
                    self.cancel.check()?;
                    result = self.task_system.execute_atomic_in_stack(&request, stack).await;
                }
            }
        }
    }
}

/// Map named and positional values onto a tool's input object
///
/// Positional values fill the schema's `required` properties in order.
fn build_tool_input(
    tool: &Arc<dyn DirectTool>,
    named: BTreeMap<String, Json>,
    positional: Vec<Value>,
) -> Result<Json, TaskError> {
    let mut object = serde_json::Map::new();
    for (key, value) in named {
        object.insert(key, value);
    }

    let schema = tool.input_schema();
    let required: Vec<String> = schema["required"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut slots = required
        .into_iter()
        .filter(|key| !object.contains_key(key))
        .collect::<Vec<_>>()
        .into_iter();
    for value in positional {
        match slots.next() {
            Some(key) => {
                object.insert(key, value.to_json());
            }
            None => {
                return Err(invalid(format!(
                    "too many positional arguments for tool '{}'",
                    tool.name()
                )));
            }
        }
    }

    Ok(Json::Object(object))
}

//! Atomic Executor
//!
//! Substitutes `{{name}}` placeholders in a single atomic template, invokes
//! the Handler, and validates the declared output format. No environment
//! walks, no composition, no context fetching - callers supply everything.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use handlebars::Handlebars;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::domain::{FailureReason, TaskError, TaskResult, TaskStatus};
use crate::handler::{Handler, PromptSpec};

use super::context::ResolvedContext;
use super::template::TemplateDefinition;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex"))
}

/// Canonical string form of a parameter value
///
/// Strings render bare (no quotes); numbers and booleans keep their JSON
/// literal form; lists and objects render as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Substitute placeholders in one template field
///
/// Fails fast with `missing_input` when any referenced key is absent from
/// the params map - substitution references only the explicit parameter map.
pub fn substitute(field: &str, params: &BTreeMap<String, Value>) -> Result<String, TaskError> {
    for capture in placeholder_re().captures_iter(field) {
        let variable = &capture[1];
        if !params.contains_key(variable) {
            return Err(TaskError::failure_with(
                FailureReason::MissingInput,
                format!("no value for placeholder '{{{{{}}}}}'", variable),
                serde_json::json!({"variable": variable}),
            ));
        }
    }

    // Sole-content placeholders take the canonical form directly, preserving
    // numeric and boolean literals for downstream JSON tasks
    if let Some(capture) = placeholder_re().captures(field.trim()) {
        if capture.get(0).map(|m| m.as_str()) == Some(field.trim()) {
            return Ok(render_value(&params[&capture[1]]));
        }
    }

    let mut rendered_params: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in params {
        rendered_params.insert(key.clone(), Value::String(render_value(value)));
    }

    let mut hbs = Handlebars::new();
    hbs.register_escape_fn(handlebars::no_escape);
    hbs.render_template(field, &rendered_params).map_err(|e| {
        TaskError::failure(
            FailureReason::MissingInput,
            format!("placeholder substitution failed: {}", e),
        )
    })
}

/// The JSON type tag of a value
fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

/// Validate a completed result against the template's declared output format
///
/// On success the parsed payload lands in `parsed_content`; on failure the
/// raw content is preserved alongside expected/actual type details.
pub fn validate_output(template: &TemplateDefinition, mut result: TaskResult) -> TaskResult {
    let Some(ref format) = template.output_format else {
        return result;
    };
    if !format.is_json() || result.status != TaskStatus::Complete {
        return result;
    }

    let parsed: Value = match serde_json::from_str(result.content.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            let error = TaskError::failure_with(
                FailureReason::OutputFormatFailure,
                format!("output is not valid JSON: {}", e),
                serde_json::json!({"expectedType": format.schema.as_deref().unwrap_or("json"), "actualType": "text"}),
            );
            return TaskResult::failed_with_content(error, result.content);
        }
    };

    if let Some(ref expected) = format.schema {
        let actual = type_tag(&parsed);
        if actual != expected {
            let error = TaskError::failure_with(
                FailureReason::OutputFormatFailure,
                format!("expected JSON {}, got {}", expected, actual),
                serde_json::json!({"expectedType": expected, "actualType": actual}),
            );
            return TaskResult::failed_with_content(error, result.content);
        }
    }

    result.parsed_content = Some(parsed);
    result
}

/// Execute one atomic template body through a Handler session
pub async fn execute_body(
    template: &TemplateDefinition,
    params: &BTreeMap<String, Value>,
    handler: &mut Handler,
    context: &ResolvedContext,
) -> TaskResult {
    debug!(template = %template.name, "execute_body: called");

    let instructions = match substitute(&template.instructions, params) {
        Ok(text) => text,
        Err(err) => return TaskResult::failed(err),
    };
    let system_prompt = match substitute(&template.system_prompt, params) {
        Ok(text) => text,
        Err(err) => return TaskResult::failed(err),
    };

    let spec = PromptSpec {
        user_prompt: instructions,
        template_system_prompt: if system_prompt.is_empty() { None } else { Some(system_prompt) },
        context_string: context.context_string.clone(),
        included_files: context.included_files.clone(),
        tool_names: Some(template.tools.clone()),
    };

    let result = handler.execute_prompt(spec).await;
    validate_output(template, result)
}

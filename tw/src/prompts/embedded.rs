//! Embedded builtin templates and prompts

use crate::domain::ContextManagement;
use crate::task::{OutputFormat, TemplateDefinition};

/// Alias of the builtin associative-matching template
pub const ASSOCIATIVE_MATCHING_ALIAS: &str = "atomic:associative_matching";

/// Base system prompt layered under every template prompt
pub const BASE_SYSTEM_PROMPT: &str = "\
You are the execution engine of a task-orchestration runtime. You receive a \
single well-scoped task with any context it needs. Complete the task \
directly and concisely. When a tool is available and needed, call it rather \
than describing what you would do. When an output format is requested, emit \
exactly that format with no surrounding prose.";

const MATCHING_SYSTEM_PROMPT: &str = "\
You select relevant files from an indexed corpus. You are given a file \
listing (path plus a one-line metadata summary per file) and a task \
description. Choose the files whose metadata suggests they matter for the \
task. Respond with a JSON array of objects, each with \"path\" (string), \
\"relevance\" (short string explaining why), and \"score\" (number between 0 \
and 1). Return [] when nothing fits. Output only the JSON array.";

const MATCHING_INSTRUCTIONS: &str = "\
File listing:
{{global_index}}

Task:
{{context_input}}

Select the relevant files.";

fn associative_matching() -> TemplateDefinition {
    TemplateDefinition {
        name: "associative_matching".to_string(),
        template_type: "atomic".to_string(),
        subtype: "associative_matching".to_string(),
        description: "Select files relevant to a task from the global metadata index".to_string(),
        params: vec!["global_index".to_string(), "context_input".to_string()],
        system_prompt: MATCHING_SYSTEM_PROMPT.to_string(),
        instructions: MATCHING_INSTRUCTIONS.to_string(),
        output_format: Some(OutputFormat::json_with_schema("array")),
        // Fresh context stays off: matching answers retrieval requests and
        // must never issue one
        context_management: Some(ContextManagement {
            inherit_context: None,
            accumulate_data: Some(false),
            fresh_context: Some(false),
        }),
        file_paths: None,
        tools: vec![],
    }
}

/// All templates registered at startup
pub fn builtin_templates() -> Vec<TemplateDefinition> {
    vec![associative_matching()]
}

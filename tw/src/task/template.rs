//! Atomic template definitions

use serde::{Deserialize, Serialize};

use crate::domain::{ContextManagement, FailureReason, TaskError};

/// Declared output format for an atomic template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFormat {
    /// "json" or "text"
    #[serde(rename = "type")]
    pub format_type: String,

    /// Type tag the parsed JSON must carry: object, array, string, number,
    /// boolean, or null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl OutputFormat {
    pub fn json() -> Self {
        Self {
            format_type: "json".to_string(),
            schema: None,
        }
    }

    pub fn json_with_schema(schema: impl Into<String>) -> Self {
        Self {
            format_type: "json".to_string(),
            schema: Some(schema.into()),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format_type == "json"
    }
}

/// A registered unit of executable LLM work
///
/// Immutable after registration. `params` is the ordered list of declared
/// inputs; `{{name}}` placeholders in `system_prompt` and `instructions`
/// reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub template_type: String,

    pub subtype: String,

    /// Used by similarity ranking
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub system_prompt: String,

    #[serde(default)]
    pub instructions: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_management: Option<ContextManagement>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_paths: Option<Vec<String>>,

    /// Tool allowlist for the execution; empty means no tools
    #[serde(default)]
    pub tools: Vec<String>,
}

impl TemplateDefinition {
    /// The `type:subtype` alias
    pub fn alias(&self) -> String {
        format!("{}:{}", self.template_type, self.subtype)
    }

    /// Registration-time validation
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.name.is_empty() {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                "template must declare a name",
            ));
        }
        if self.template_type != "atomic" {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                format!("template '{}' has unsupported type '{}'", self.name, self.template_type),
            ));
        }
        if self.subtype.is_empty() {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                format!("template '{}' must declare a subtype", self.name),
            ));
        }
        Ok(())
    }
}

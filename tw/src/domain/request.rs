//! Subtask requests, context-management settings, retrieval inputs/outputs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{FailureReason, TaskError};

/// How much caller context a task inherits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InheritMode {
    #[default]
    None,
    Full,
    Subset,
}

/// Per-task context-management settings
///
/// Every field is optional so the block can act as an override; precedence is
/// request over template over system default, merged field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextManagement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit_context: Option<InheritMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulate_data: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh_context: Option<bool>,
}

/// Fully resolved settings after precedence merging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedContextManagement {
    pub inherit_context: InheritMode,
    pub accumulate_data: bool,
    pub fresh_context: bool,
}

impl ResolvedContextManagement {
    /// System defaults for atomic tasks
    pub fn atomic_defaults() -> Self {
        Self {
            inherit_context: InheritMode::None,
            accumulate_data: false,
            fresh_context: true,
        }
    }

    /// Merge request-level and template-level overrides onto the defaults,
    /// field by field, request winning
    pub fn resolve(request: Option<&ContextManagement>, template: Option<&ContextManagement>) -> Self {
        let defaults = Self::atomic_defaults();
        let pick = |f: fn(&ContextManagement) -> Option<InheritMode>, d: InheritMode| {
            request.and_then(f).or_else(|| template.and_then(f)).unwrap_or(d)
        };
        let pick_bool = |f: fn(&ContextManagement) -> Option<bool>, d: bool| {
            request.and_then(f).or_else(|| template.and_then(f)).unwrap_or(d)
        };
        Self {
            inherit_context: pick(|c| c.inherit_context, defaults.inherit_context),
            accumulate_data: pick_bool(|c| c.accumulate_data, defaults.accumulate_data),
            fresh_context: pick_bool(|c| c.fresh_context, defaults.fresh_context),
        }
    }
}

/// Request for a nested atomic execution
///
/// Produced by evaluator primitives and by atomic tasks returning
/// CONTINUATION. Either `name` or `subtype` must identify the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskRequest {
    #[serde(rename = "type", default = "SubtaskRequest::atomic_type")]
    pub task_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default)]
    pub inputs: BTreeMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_paths: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_management: Option<ContextManagement>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_hints: Vec<String>,
}

impl SubtaskRequest {
    fn atomic_type() -> String {
        "atomic".to_string()
    }

    /// Request addressed by template name
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            task_type: Self::atomic_type(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Request addressed by `atomic:<subtype>` alias
    pub fn by_subtype(subtype: impl Into<String>) -> Self {
        Self {
            task_type: Self::atomic_type(),
            subtype: Some(subtype.into()),
            ..Default::default()
        }
    }

    /// Add one input binding
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    /// Identifier used for dispatch and cycle detection
    pub fn identifier(&self) -> String {
        if let Some(ref name) = self.name {
            name.clone()
        } else if let Some(ref subtype) = self.subtype {
            format!("{}:{}", self.task_type, subtype)
        } else {
            String::new()
        }
    }

    /// Structural validation; absence of a target is a failure
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.task_type != "atomic" {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                format!("unsupported subtask type: {}", self.task_type),
            ));
        }
        if self.name.is_none() && self.subtype.is_none() {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                "subtask request names neither a template nor a subtype",
            ));
        }
        Ok(())
    }
}

/// Input to context retrieval
///
/// Either the template fields or an explicit `query` must be populated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextGenerationInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_subtype: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_context: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_outputs: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl ContextGenerationInput {
    /// Build from a free-text query
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    /// True when no retrieval target is present
    pub fn is_empty(&self) -> bool {
        self.query.is_none()
            && self.template_description.is_none()
            && self.template_type.is_none()
            && self.template_subtype.is_none()
    }

    /// Reject inputs with neither a query nor template fields
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.is_empty() {
            return Err(TaskError::failure(
                FailureReason::InvalidInput,
                "context generation input has neither a query nor template fields",
            ));
        }
        Ok(())
    }

    /// The text handed to associative matching
    pub fn effective_query(&self) -> String {
        if let Some(ref query) = self.query {
            return query.clone();
        }
        let mut parts = Vec::new();
        if let Some(ref d) = self.template_description {
            parts.push(d.clone());
        }
        if let (Some(t), Some(s)) = (&self.template_type, &self.template_subtype) {
            parts.push(format!("{}:{}", t, s));
        }
        if let Some(ref inputs) = self.inputs {
            for (key, value) in inputs {
                parts.push(format!("{}={}", key, value));
            }
        }
        parts.join(" ")
    }
}

/// One file selected by associative matching; paths only, never contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMatch {
    pub path: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<String>,

    pub score: f64,
}

/// Result of associative matching
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssociativeMatchResult {
    /// Human-readable summary of what was matched
    pub context: String,
    pub matches: Vec<FileMatch>,
}

impl AssociativeMatchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.matches.iter().map(|m| m.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let resolved = ResolvedContextManagement::resolve(None, None);
        assert_eq!(resolved.inherit_context, InheritMode::None);
        assert!(!resolved.accumulate_data);
        assert!(resolved.fresh_context);
    }

    #[test]
    fn test_resolve_request_wins_per_field() {
        let template = ContextManagement {
            inherit_context: Some(InheritMode::Full),
            accumulate_data: Some(true),
            fresh_context: Some(false),
        };
        let request = ContextManagement {
            inherit_context: None,
            accumulate_data: Some(false),
            fresh_context: None,
        };
        let resolved = ResolvedContextManagement::resolve(Some(&request), Some(&template));

        // Request overrides accumulate_data; template fills the rest
        assert_eq!(resolved.inherit_context, InheritMode::Full);
        assert!(!resolved.accumulate_data);
        assert!(!resolved.fresh_context);
    }

    #[test]
    fn test_subtask_request_identifier() {
        assert_eq!(SubtaskRequest::by_name("aider:automatic").identifier(), "aider:automatic");
        assert_eq!(SubtaskRequest::by_subtype("associative_matching").identifier(), "atomic:associative_matching");
    }

    #[test]
    fn test_subtask_request_validation() {
        assert!(SubtaskRequest::by_name("x").validate().is_ok());
        assert!(SubtaskRequest::default().validate().is_err());

        let mut wrong_type = SubtaskRequest::by_name("x");
        wrong_type.task_type = "composite".to_string();
        assert!(wrong_type.validate().is_err());
    }

    #[test]
    fn test_context_input_validation() {
        assert!(ContextGenerationInput::from_query("auth logic").validate().is_ok());
        assert!(ContextGenerationInput::default().validate().is_err());

        let from_template = ContextGenerationInput {
            template_description: Some("find callers".to_string()),
            ..Default::default()
        };
        assert!(from_template.validate().is_ok());
    }

    #[test]
    fn test_effective_query_prefers_explicit() {
        let input = ContextGenerationInput {
            query: Some("explicit".to_string()),
            template_description: Some("ignored".to_string()),
            ..Default::default()
        };
        assert_eq!(input.effective_query(), "explicit");
    }

    #[test]
    fn test_effective_query_from_template_fields() {
        let mut inputs = BTreeMap::new();
        inputs.insert("target".to_string(), serde_json::json!("auth.py"));
        let input = ContextGenerationInput {
            template_description: Some("edit a file".to_string()),
            template_type: Some("atomic".to_string()),
            template_subtype: Some("edit".to_string()),
            inputs: Some(inputs),
            ..Default::default()
        };
        let query = input.effective_query();
        assert!(query.contains("edit a file"));
        assert!(query.contains("atomic:edit"));
        assert!(query.contains("target"));
    }

    #[test]
    fn test_subtask_request_round_trip() {
        let request = SubtaskRequest::by_subtype("edit").with_input("prompt", serde_json::json!("fix it"));
        let json = serde_json::to_string(&request).unwrap();
        let back: SubtaskRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.subtype.as_deref(), Some("edit"));
        assert_eq!(back.inputs["prompt"], "fix it");
        assert_eq!(back.task_type, "atomic");
    }
}

//! Tool registry - direct executors and subtask markers under one interface

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::llm::ToolDefinition;

use super::ToolContext;

/// A tool the Handler executes synchronously
#[async_trait]
pub trait DirectTool: Send + Sync {
    /// Tool name (matches the LLM tool_use name)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Result of a direct tool execution
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A registered tool, tagged by kind
///
/// Both kinds surface identically to the LLM; only the Handler's handling of
/// an invocation differs.
#[derive(Clone)]
pub enum RegisteredTool {
    Direct(Arc<dyn DirectTool>),
    Subtask {
        name: String,
        description: String,
        template_hints: Vec<String>,
        input_schema: Value,
    },
}

impl RegisteredTool {
    pub fn name(&self) -> &str {
        match self {
            RegisteredTool::Direct(tool) => tool.name(),
            RegisteredTool::Subtask { name, .. } => name,
        }
    }

    /// Definition surfaced to the model
    pub fn definition(&self) -> ToolDefinition {
        match self {
            RegisteredTool::Direct(tool) => {
                ToolDefinition::new(tool.name(), tool.description(), tool.input_schema())
            }
            RegisteredTool::Subtask {
                name,
                description,
                input_schema,
                ..
            } => ToolDefinition::new(name.clone(), description.clone(), input_schema.clone()),
        }
    }
}

/// Registry of tools available to one Handler session
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    /// Registration order, for stable definition listings
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a direct tool
    pub fn register_direct(&mut self, tool: Arc<dyn DirectTool>) {
        debug!(tool_name = %tool.name(), "ToolRegistry::register_direct: called");
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), RegisteredTool::Direct(tool)).is_none() {
            self.order.push(name);
        }
    }

    /// Register a subtask tool
    ///
    /// Invocation yields a CONTINUATION; the Handler never executes it.
    pub fn register_subtask(&mut self, name: impl Into<String>, template_hints: Vec<String>) {
        let name = name.into();
        debug!(tool_name = %name, hints = template_hints.len(), "ToolRegistry::register_subtask: called");
        let description = format!(
            "Spawn the '{}' subtask. Provide its inputs as named arguments.",
            name
        );
        let registered = RegisteredTool::Subtask {
            name: name.clone(),
            description,
            template_hints,
            input_schema: serde_json::json!({
                "type": "object",
                "additionalProperties": true
            }),
        };
        if self.tools.insert(name.clone(), registered).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Definitions for the LLM, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(RegisteredTool::definition)
            .collect()
    }
}

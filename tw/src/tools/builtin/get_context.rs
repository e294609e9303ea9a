//! get_context tool - associative retrieval against the global index

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::ContextGenerationInput;
use crate::memory::MemorySystem;
use crate::tools::{DirectTool, ToolContext, ToolOutcome};

/// Retrieve relevant file paths for a query via the Memory System
///
/// Returns paths and per-match notes only - never file contents.
pub struct GetContextTool {
    memory: Arc<MemorySystem>,
}

impl GetContextTool {
    pub fn new(memory: Arc<MemorySystem>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl DirectTool for GetContextTool {
    fn name(&self) -> &'static str {
        "get_context"
    }

    fn description(&self) -> &'static str {
        "Find files relevant to a query in the indexed corpus. Returns paths with relevance notes and scores."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolOutcome {
        let query = match input["query"].as_str() {
            Some(q) => q,
            None => return ToolOutcome::error("query is required"),
        };
        debug!(%query, "GetContextTool::execute: called");

        match self
            .memory
            .get_relevant_context_for(&ContextGenerationInput::from_query(query))
            .await
        {
            Ok(result) => match serde_json::to_string(&result.matches) {
                Ok(json) => ToolOutcome::success(json),
                Err(e) => ToolOutcome::error(format!("Failed to serialise matches: {}", e)),
            },
            Err(e) => ToolOutcome::error(format!("Context retrieval failed: {}", e)),
        }
    }
}

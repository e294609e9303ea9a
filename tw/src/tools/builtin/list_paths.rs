//! list_paths tool - find files matching a glob pattern

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{DirectTool, ToolContext, ToolOutcome};

/// Find files matching a glob pattern, returned as a JSON array of paths
pub struct ListPathsTool;

#[async_trait]
impl DirectTool for ListPathsTool {
    fn name(&self) -> &'static str {
        "list_paths"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern (e.g. **/*.py). Returns a JSON array of paths."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match"
                },
                "path": {
                    "type": "string",
                    "description": "Base directory (default: working directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let pattern = match input["pattern"].as_str() {
            Some(p) => p,
            None => return ToolOutcome::error("pattern is required"),
        };

        let base = input["path"].as_str().unwrap_or(".");
        let base_path = ctx.resolve_path(Path::new(base));
        let full_pattern = base_path.join(pattern);

        let pattern_str = match full_pattern.to_str() {
            Some(s) => s,
            None => return ToolOutcome::error("pattern is not valid UTF-8"),
        };
        debug!(pattern = %pattern_str, "ListPathsTool::execute: globbing");

        let entries = match glob::glob(pattern_str) {
            Ok(entries) => entries,
            Err(e) => return ToolOutcome::error(format!("Invalid glob pattern: {}", e)),
        };

        let mut paths: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        paths.sort();

        ToolOutcome::success(serde_json::json!(paths).to_string())
    }
}

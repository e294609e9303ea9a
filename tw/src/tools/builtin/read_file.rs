//! read_file tool - read file contents with line numbers

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{DirectTool, ToolContext, ToolOutcome};

/// Read a file's contents, line-numbered by default
pub struct ReadFileTool;

/// Read a file without formatting; used for context assembly
pub async fn read_file_raw(path: &Path) -> std::io::Result<String> {
    tokio::fs::read_to_string(path).await
}

#[async_trait]
impl DirectTool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file's contents with line numbers."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, absolute or relative to the working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Max lines to read (default: 2000)"
                },
                "numbered": {
                    "type": "boolean",
                    "description": "Prefix each line with its number (default: true)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let path = match input["path"].as_str() {
            Some(p) => p,
            None => return ToolOutcome::error("path is required"),
        };

        let offset = input["offset"].as_u64().unwrap_or(1) as usize;
        let limit = input["limit"].as_u64().unwrap_or(2000) as usize;
        let numbered = input["numbered"].as_bool().unwrap_or(true);

        let full_path = ctx.resolve_path(Path::new(path));

        let content = match read_file_raw(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolOutcome::error(format!("Failed to read file: {}", e)),
        };

        let lines: Vec<String> = content
            .lines()
            .skip(offset.saturating_sub(1))
            .take(limit)
            .enumerate()
            .map(|(i, line)| {
                if numbered {
                    format!("{:>6}│{}", offset + i, line)
                } else {
                    line.to_string()
                }
            })
            .collect();

        ToolOutcome::success(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_file_basic() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2\nline 3").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = ReadFileTool.execute(serde_json::json!({"path": "test.txt"}), &ctx).await;

        assert!(!result.is_error);
        assert!(result.content.contains("line 1"));
        assert!(result.content.contains("line 3"));
    }

    #[tokio::test]
    async fn test_read_file_with_offset_and_limit() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2\nline 3\nline 4").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "test.txt", "offset": 2, "limit": 2}), &ctx)
            .await;

        assert!(!result.is_error);
        assert!(!result.content.contains("│line 1"));
        assert!(result.content.contains("line 2"));
        assert!(result.content.contains("line 3"));
        assert!(!result.content.contains("line 4"));
    }

    #[tokio::test]
    async fn test_read_file_unnumbered() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "plain").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        let result = ReadFileTool
            .execute(serde_json::json!({"path": "test.txt", "numbered": false}), &ctx)
            .await;

        assert_eq!(result.content, "plain");
    }

    #[tokio::test]
    async fn test_read_file_not_found() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadFileTool.execute(serde_json::json!({"path": "missing.txt"}), &ctx).await;
        assert!(result.is_error);
        assert!(result.content.contains("Failed to read"));
    }

    #[tokio::test]
    async fn test_read_file_missing_path_argument() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ReadFileTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }
}

//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during tool execution
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Script timed out after {timeout_ms}ms")]
    ScriptTimeout { timeout_ms: u64 },

    #[error("Tool not found: {name}")]
    UnknownTool { name: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_message() {
        let err = ToolError::UnknownTool {
            name: "frobnicate".to_string(),
        };
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_timeout_message_carries_budget() {
        let err = ToolError::ScriptTimeout { timeout_ms: 5000 };
        assert!(err.to_string().contains("5000"));
    }
}

//! Programmatic executors
//!
//! Native functions registered under a `name:subtype` identifier. They take
//! dispatch precedence over templates and never touch a model - the reliable
//! path for wrapping external tools.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::domain::TaskResult;
use crate::tools::builtin::RunScriptTool;
use crate::tools::{DirectTool, ToolContext};

/// Services a programmatic executor may use
#[derive(Debug, Clone)]
pub struct SharedServices {
    /// Working directory for file and process operations
    pub root: PathBuf,

    /// Cooperative cancellation signal
    pub cancel: CancelToken,
}

/// A registered native function dispatched ahead of any template
#[async_trait]
pub trait ProgrammaticExecutor: Send + Sync {
    /// Identifier matched against the request's `name` or `type:subtype`
    fn name(&self) -> &str;

    /// Execute with the request's flat input map
    async fn execute(&self, inputs: &BTreeMap<String, Value>, services: &SharedServices) -> TaskResult;
}

/// Builtin executor wrapping shell execution under `shell:command`
///
/// Inputs: `command` (required), `timeout_ms` (optional).
pub struct ShellCommandExecutor;

#[async_trait]
impl ProgrammaticExecutor for ShellCommandExecutor {
    fn name(&self) -> &str {
        "shell:command"
    }

    async fn execute(&self, inputs: &BTreeMap<String, Value>, services: &SharedServices) -> TaskResult {
        debug!("ShellCommandExecutor::execute: called");
        let ctx = ToolContext::new(services.root.clone(), "programmatic").with_cancel(services.cancel.clone());

        let mut input = serde_json::Map::new();
        for (key, value) in inputs {
            input.insert(key.clone(), value.clone());
        }

        let outcome = RunScriptTool.execute(Value::Object(input), &ctx).await;
        if outcome.is_error {
            TaskResult::failed_with_content(
                crate::domain::TaskError::failure(crate::domain::FailureReason::ToolError, outcome.content.clone()),
                outcome.content,
            )
        } else {
            TaskResult::complete(outcome.content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;

    fn services() -> SharedServices {
        SharedServices {
            root: std::env::temp_dir(),
            cancel: CancelToken::new(),
        }
    }

    #[tokio::test]
    async fn test_shell_command_executor_success() {
        let mut inputs = BTreeMap::new();
        inputs.insert("command".to_string(), serde_json::json!("echo programmatic"));

        let result = ShellCommandExecutor.execute(&inputs, &services()).await;

        assert_eq!(result.status, TaskStatus::Complete);
        assert!(result.content.contains("programmatic"));
    }

    #[tokio::test]
    async fn test_shell_command_executor_failure() {
        let mut inputs = BTreeMap::new();
        inputs.insert("command".to_string(), serde_json::json!("exit 9"));

        let result = ShellCommandExecutor.execute(&inputs, &services()).await;

        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.content.contains("exit code 9"));
    }

    #[tokio::test]
    async fn test_shell_command_executor_missing_command() {
        let result = ShellCommandExecutor.execute(&BTreeMap::new(), &services()).await;
        assert_eq!(result.status, TaskStatus::Failed);
    }
}

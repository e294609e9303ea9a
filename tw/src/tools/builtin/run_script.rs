//! run_script tool - execute a shell command with a timeout

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::tools::{DirectTool, ToolContext, ToolOutcome};

/// Default command timeout (2 minutes)
const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Execute a shell command in the working directory
pub struct RunScriptTool;

#[async_trait]
impl DirectTool for RunScriptTool {
    fn name(&self) -> &'static str {
        "run_script"
    }

    fn description(&self) -> &'static str {
        "Run a shell command and return combined stdout/stderr with the exit code."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolOutcome {
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => return ToolOutcome::error("command is required"),
        };
        if ctx.cancel.is_cancelled() {
            return ToolOutcome::error("cancelled before execution");
        }

        let timeout_ms = input["timeout_ms"].as_u64().unwrap_or(DEFAULT_TIMEOUT_MS);
        debug!(%command, timeout_ms, "RunScriptTool::execute: spawning");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => return ToolOutcome::error(format!("Failed to spawn: {}", e)),
        };

        let output = match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolOutcome::error(format!("Failed to run command: {}", e)),
            Err(_) => return ToolOutcome::error(format!("Command timed out after {}ms", timeout_ms)),
        };

        let mut content = String::new();
        content.push_str(&String::from_utf8_lossy(&output.stdout));
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&stderr);
        }

        let code = output.status.code().unwrap_or(-1);
        if code == 0 {
            ToolOutcome::success(content)
        } else {
            ToolOutcome::error(format!("exit code {}: {}", code, content))
        }
    }
}

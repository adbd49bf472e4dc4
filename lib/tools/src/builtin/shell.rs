//! Shell command tool.

use super::{optional_str, optional_u64, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use flowstone_workflow::execution::LogLevel;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Runs a command line through the system shell.
///
/// A non-zero exit status is not an invocation error; the exit code is
/// part of the output so workflows can branch on it.
#[derive(Default)]
pub struct ShellTool;

impl ShellTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "shell".to_string(),
            name: "Shell".to_string(),
            description: "Runs a command line through the system shell with a timeout".to_string(),
            category: ToolCategory::System,
            input_schema: json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": { "type": "string" },
                    "cwd": { "type": "string" },
                    "timeoutMs": { "type": "integer" }
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "stdout": { "type": "string" },
                    "stderr": { "type": "string" },
                    "exitCode": { "type": "integer" }
                }
            }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let command_line = require_str(&input, "command")?;
        let timeout_ms = optional_u64(&input, "timeoutMs").unwrap_or(DEFAULT_TIMEOUT_MS);

        ctx.log(LogLevel::Debug, format!("shell: {command_line}"));

        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        if let Some(cwd) = optional_str(&input, "cwd") {
            command.current_dir(cwd);
        }
        command.kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_millis(timeout_ms), command.output())
            .await
            .map_err(|_| ToolError::Timeout {
                after_ms: timeout_ms,
            })?
            .map_err(|e| ToolError::Subprocess {
                message: format!("failed to spawn shell: {e}"),
            })?;

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "exitCode": output.status.code().unwrap_or(-1),
        }))
    }
}

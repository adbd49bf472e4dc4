//! Python evaluation tool.
//!
//! Writes a wrapper script that reads the input as a JSON document on
//! standard input and prints the `result` binding between the literal
//! framing markers on standard output. The tool strips the frame and
//! parses the captured payload.

use super::{RESULT_BEGIN, RESULT_END, extract_framed, optional_u64, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Evaluates Python source with `input` bound and `result` captured.
#[derive(Default)]
pub struct PythonTool;

impl PythonTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Builds the wrapper script around the user source.
pub(crate) fn wrapper_script(code: &str) -> String {
    format!(
        "import json, sys\n\
         input = json.load(sys.stdin)\n\
         result = None\n\
         {code}\n\
         print(\"{RESULT_BEGIN}\")\n\
         print(json.dumps(result))\n\
         print(\"{RESULT_END}\")\n"
    )
}

/// Runs a script file with JSON on stdin and returns the framed result.
pub(crate) async fn run_script(
    interpreter: &str,
    script_path: &std::path::Path,
    stdin_value: &JsonValue,
    timeout_ms: u64,
) -> Result<JsonValue, ToolError> {
    let mut child = Command::new(interpreter)
        .arg(script_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ToolError::Subprocess {
            message: format!("failed to spawn {interpreter}: {e}"),
        })?;

    let payload = serde_json::to_vec(stdin_value)?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(&payload).await?;
        drop(stdin);
    }

    let output = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| ToolError::Timeout {
        after_ms: timeout_ms,
    })?
    .map_err(|e| ToolError::Subprocess {
        message: e.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ToolError::Subprocess {
            message: format!(
                "{interpreter} exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    extract_framed(&stdout)
}

#[async_trait]
impl Tool for PythonTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "python".to_string(),
            name: "Python".to_string(),
            description: "Evaluates Python source with the gathered value bound as `input`"
                .to_string(),
            category: ToolCategory::Code,
            input_schema: json!({
                "type": "object",
                "required": ["code"],
                "properties": {
                    "code": { "type": "string" },
                    "input": {},
                    "timeoutMs": { "type": "integer" }
                }
            }),
            output_schema: json!({ "description": "The script's `result` binding" }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        _ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let code = require_str(&input, "code")?;
        let timeout_ms = optional_u64(&input, "timeoutMs").unwrap_or(DEFAULT_TIMEOUT_MS);
        let stdin_value = input.get("input").cloned().unwrap_or(JsonValue::Null);

        let script = wrapper_script(code);
        let file = tempfile::Builder::new()
            .prefix("flowstone-py-")
            .suffix(".py")
            .tempfile()?;
        tokio::fs::write(file.path(), &script).await?;

        run_script("python3", file.path(), &stdin_value, timeout_ms).await
    }
}

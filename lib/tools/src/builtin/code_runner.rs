//! Multi-language code runner tool.
//!
//! Evaluates user source in a subprocess using the same framing
//! protocol as the `python` tool: input arrives as JSON on stdin and the
//! result is printed between the literal markers.

use super::python::{run_script, wrapper_script};
use super::{RESULT_BEGIN, RESULT_END, optional_u64, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Runs user source in `javascript`, `typescript` (via node), or `python`.
#[derive(Default)]
pub struct CodeRunnerTool;

impl CodeRunnerTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Builds the node wrapper: the user source becomes a function body
/// receiving `input`; its return value is framed on stdout.
pub(crate) fn node_wrapper(code: &str) -> String {
    format!(
        "const chunks = [];\n\
         process.stdin.on('data', (c) => chunks.push(c));\n\
         process.stdin.on('end', () => {{\n\
         const input = JSON.parse(chunks.join('') || 'null');\n\
         const result = (function (input) {{\n\
         {code}\n\
         }})(input);\n\
         console.log(\"{RESULT_BEGIN}\");\n\
         console.log(JSON.stringify(result === undefined ? null : result));\n\
         console.log(\"{RESULT_END}\");\n\
         }});\n"
    )
}

#[async_trait]
impl Tool for CodeRunnerTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "code-runner".to_string(),
            name: "Code Runner".to_string(),
            description: "Runs user source in a subprocess (node or python3) and returns its result"
                .to_string(),
            category: ToolCategory::Code,
            input_schema: json!({
                "type": "object",
                "required": ["language", "code"],
                "properties": {
                    "language": { "enum": ["javascript", "typescript", "python"] },
                    "code": { "type": "string" },
                    "input": {},
                    "timeoutMs": { "type": "integer" }
                }
            }),
            output_schema: json!({ "description": "The code's return value / result binding" }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        _ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let language = require_str(&input, "language")?;
        let code = require_str(&input, "code")?;
        let timeout_ms = optional_u64(&input, "timeoutMs").unwrap_or(DEFAULT_TIMEOUT_MS);
        let stdin_value = input.get("input").cloned().unwrap_or(JsonValue::Null);

        let (interpreter, script, suffix) = match language {
            // TypeScript type annotations are not erased here; plain
            // node evaluation covers the JS subset workflows emit.
            "javascript" | "typescript" => ("node", node_wrapper(code), ".js"),
            "python" => ("python3", wrapper_script(code), ".py"),
            other => {
                return Err(ToolError::InvalidInput {
                    message: format!("unsupported language '{other}'"),
                });
            }
        };

        let file = tempfile::Builder::new()
            .prefix("flowstone-run-")
            .suffix(suffix)
            .tempfile()?;
        tokio::fs::write(file.path(), &script).await?;

        run_script(interpreter, file.path(), &stdin_value, timeout_ms).await
    }
}

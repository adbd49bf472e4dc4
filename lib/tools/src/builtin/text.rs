//! Pure text manipulation tool.

use super::{optional_str, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

/// Text operations over the `value` field of the input record.
#[derive(Default)]
pub struct TextTool;

impl TextTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for TextTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "text".to_string(),
            name: "Text".to_string(),
            description: "Pure text operations: concat, join, split, replace, case, trim"
                .to_string(),
            category: ToolCategory::Data,
            input_schema: json!({
                "type": "object",
                "required": ["operation"],
                "properties": {
                    "operation": { "enum": ["concat", "join", "split", "replace", "uppercase", "lowercase", "trim"] },
                    "value": {},
                    "separator": { "type": "string" },
                    "pattern": { "type": "string" },
                    "replacement": { "type": "string" }
                }
            }),
            output_schema: json!({ "description": "Operation result" }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        _ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let operation = require_str(&input, "operation")?;

        let as_string = |v: &JsonValue| -> String {
            match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            }
        };

        match operation {
            "concat" | "join" => {
                let separator = optional_str(&input, "separator").unwrap_or("");
                let parts = input
                    .get("value")
                    .and_then(JsonValue::as_array)
                    .ok_or_else(|| ToolError::InvalidInput {
                        message: format!("{operation} expects 'value' to be an array"),
                    })?;
                let joined: Vec<String> = parts.iter().map(&as_string).collect();
                Ok(JsonValue::String(joined.join(separator)))
            }
            "split" => {
                let text = require_str(&input, "value")?;
                let separator = require_str(&input, "separator")?;
                let parts: Vec<JsonValue> = text
                    .split(separator)
                    .map(|s| JsonValue::String(s.to_string()))
                    .collect();
                Ok(JsonValue::Array(parts))
            }
            "replace" => {
                let text = require_str(&input, "value")?;
                let pattern = require_str(&input, "pattern")?;
                let replacement = optional_str(&input, "replacement").unwrap_or("");
                Ok(JsonValue::String(text.replace(pattern, replacement)))
            }
            "uppercase" => Ok(JsonValue::String(
                require_str(&input, "value")?.to_uppercase(),
            )),
            "lowercase" => Ok(JsonValue::String(
                require_str(&input, "value")?.to_lowercase(),
            )),
            "trim" => Ok(JsonValue::String(
                require_str(&input, "value")?.trim().to_string(),
            )),
            other => Err(ToolError::InvalidInput {
                message: format!("unknown operation '{other}'"),
            }),
        }
    }
}

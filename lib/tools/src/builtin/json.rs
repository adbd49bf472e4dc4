//! Pure JSON manipulation tool.

use super::{optional_str, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

/// JSON operations over the `value` field of the input record.
#[derive(Default)]
pub struct JsonTool;

impl JsonTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Walks a dot-separated path. Array segments may be numeric indices.
fn get_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a dot-separated path, creating intermediate objects.
fn set_path(value: &mut JsonValue, path: &str, new_value: JsonValue) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = value;
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = json!({});
        }
        let map = current.as_object_mut().expect("object ensured above");
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), new_value);
            return;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| json!({}));
    }
}

#[async_trait]
impl Tool for JsonTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "json".to_string(),
            name: "JSON".to_string(),
            description: "Pure JSON operations: parse, stringify, get, set, merge, keys"
                .to_string(),
            category: ToolCategory::Data,
            input_schema: json!({
                "type": "object",
                "required": ["operation"],
                "properties": {
                    "operation": { "enum": ["parse", "stringify", "get", "set", "merge", "keys"] },
                    "value": {},
                    "path": { "type": "string" },
                    "other": {}
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
        let value = input.get("value").cloned().unwrap_or(JsonValue::Null);

        match operation {
            "parse" => {
                let text = value.as_str().ok_or_else(|| ToolError::InvalidInput {
                    message: "parse expects 'value' to be a string".to_string(),
                })?;
                Ok(serde_json::from_str(text)?)
            }
            "stringify" => Ok(JsonValue::String(serde_json::to_string(&value)?)),
            "get" => {
                let path = optional_str(&input, "path").unwrap_or("");
                Ok(get_path(&value, path).cloned().unwrap_or(JsonValue::Null))
            }
            "set" => {
                let path = require_str(&input, "path")?;
                let other = input.get("other").cloned().unwrap_or(JsonValue::Null);
                let mut result = value;
                set_path(&mut result, path, other);
                Ok(result)
            }
            "merge" => {
                let mut base = value
                    .as_object()
                    .cloned()
                    .ok_or_else(|| ToolError::InvalidInput {
                        message: "merge expects 'value' to be an object".to_string(),
                    })?;
                if let Some(other) = input.get("other").and_then(JsonValue::as_object) {
                    for (k, v) in other {
                        base.insert(k.clone(), v.clone());
                    }
                }
                Ok(JsonValue::Object(base))
            }
            "keys" => {
                let keys: Vec<JsonValue> = value
                    .as_object()
                    .map(|m| m.keys().cloned().map(JsonValue::String).collect())
                    .unwrap_or_default();
                Ok(JsonValue::Array(keys))
            }
            other => Err(ToolError::InvalidInput {
                message: format!("unknown operation '{other}'"),
            }),
        }
    }
}

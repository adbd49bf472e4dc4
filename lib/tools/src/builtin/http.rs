//! HTTP request tool.
//!
//! The single HTTP implementation in the runtime: `http` nodes
//! interpolate their placeholders and then delegate here.

use super::{optional_u64, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Performs one HTTP request described by the input record.
pub struct HttpTool {
    client: reqwest::Client,
}

impl HttpTool {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn parse_method(method: &str) -> Result<reqwest::Method, ToolError> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(reqwest::Method::GET),
        "POST" => Ok(reqwest::Method::POST),
        "PUT" => Ok(reqwest::Method::PUT),
        "DELETE" => Ok(reqwest::Method::DELETE),
        "PATCH" => Ok(reqwest::Method::PATCH),
        other => Err(ToolError::InvalidInput {
            message: format!("unsupported method '{other}'"),
        }),
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "http".to_string(),
            name: "HTTP Request".to_string(),
            description: "Performs an HTTP request and returns the parsed response body".to_string(),
            category: ToolCategory::Web,
            input_schema: json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": { "type": "string" },
                    "method": { "enum": ["GET", "POST", "PUT", "DELETE", "PATCH"] },
                    "headers": { "type": "object" },
                    "body": {},
                    "timeoutMs": { "type": "integer" }
                }
            }),
            output_schema: json!({
                "description": "Response body, parsed as JSON when the content type indicates it"
            }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let url = require_str(&input, "url")?;
        let method = parse_method(input.get("method").and_then(JsonValue::as_str).unwrap_or("GET"))?;
        let timeout_ms = optional_u64(&input, "timeoutMs").unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut request = self
            .client
            .request(method, url)
            .timeout(Duration::from_millis(timeout_ms));

        let mut has_content_type = false;
        if let Some(headers) = input.get("headers").and_then(JsonValue::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    if name.eq_ignore_ascii_case("content-type") {
                        has_content_type = true;
                    }
                    request = request.header(name, value);
                }
            }
        }

        if let Some(body) = input.get("body") {
            match body {
                JsonValue::Null => {}
                JsonValue::String(text) => {
                    request = request.body(text.clone());
                }
                other => {
                    // Object bodies default the content type to JSON.
                    if !has_content_type {
                        request = request.header("Content-Type", "application/json");
                    }
                    request = request.body(serde_json::to_string(other)?);
                }
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    after_ms: timeout_ms,
                }
            } else {
                ToolError::from(e)
            }
        })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));

        ctx.emit(
            "http:response",
            json!({ "url": url, "status": status.as_u16() }),
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Http {
                message: format!("status {status} from {url}: {body}"),
            });
        }

        let text = response.text().await.map_err(ToolError::from)?;
        if is_json {
            serde_json::from_str(&text).map_err(|e| ToolError::Parse {
                message: format!("response declared JSON but did not parse: {e}"),
            })
        } else {
            Ok(JsonValue::String(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_method_accepts_closed_set() {
        assert_eq!(parse_method("get").unwrap(), reqwest::Method::GET);
        assert_eq!(parse_method("PATCH").unwrap(), reqwest::Method::PATCH);
        assert!(parse_method("TRACE").is_err());
    }

    #[test]
    fn spec_requires_url() {
        let spec = HttpTool::new(reqwest::Client::new()).spec();
        assert_eq!(spec.id, "http");
        assert_eq!(spec.input_schema["required"][0], "url");
    }
}

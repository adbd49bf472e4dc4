//! Page fetch tool.

use super::require_str;
use super::scraper::{extract_tag, strip_html};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

/// Fetches a page and returns its status, title, and visible text.
pub struct BrowserTool {
    client: reqwest::Client,
}

impl BrowserTool {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "browser".to_string(),
            name: "Browser".to_string(),
            description: "Fetches a page and returns status, title, and visible text".to_string(),
            category: ToolCategory::Web,
            input_schema: json!({
                "type": "object",
                "required": ["url"],
                "properties": { "url": { "type": "string" } }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "status": { "type": "integer" },
                    "title": { "type": "string" },
                    "text": { "type": "string" }
                }
            }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let url = require_str(&input, "url")?;
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let html = response.text().await?;

        ctx.emit("browser:fetched", json!({ "url": url, "status": status }));

        let title = extract_tag(&html, "title").into_iter().next();
        Ok(json!({
            "status": status,
            "title": title,
            "text": strip_html(&html),
        }))
    }
}

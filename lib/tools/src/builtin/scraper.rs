//! Page text extraction tool.

use super::{optional_str, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

/// Fetches a page and extracts text content, optionally restricted to
/// one tag name.
pub struct ScraperTool {
    client: reqwest::Client,
}

impl ScraperTool {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Strips tags, scripts, and styles from HTML, collapsing whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 4);
    let mut rest = html;
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    // ASCII lowercasing preserves byte offsets, unlike full Unicode
    // lowercasing, so indices found in `lower` are valid in `rest`.
    let ascii_lower = |s: &str| -> String { s.chars().map(|c| c.to_ascii_lowercase()).collect() };

    while !rest.is_empty() {
        if let Some(close) = skip_until {
            match ascii_lower(rest).find(close) {
                Some(pos) => {
                    rest = &rest[pos + close.len()..];
                    skip_until = None;
                }
                None => break,
            }
            continue;
        }

        let Some(ch) = rest.chars().next() else { break };
        if in_tag {
            if ch == '>' {
                in_tag = false;
            }
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        if ch == '<' {
            let lower = ascii_lower(rest);
            if lower.starts_with("<script") {
                skip_until = Some("</script>");
            } else if lower.starts_with("<style") {
                skip_until = Some("</style>");
            } else {
                in_tag = true;
            }
            rest = &rest[1..];
            continue;
        }
        text.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts the inner content of every occurrence of a tag.
pub(crate) fn extract_tag(html: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let lower: String = html.chars().map(|c| c.to_ascii_lowercase()).collect();
    let mut matches = Vec::new();
    let mut offset = 0;

    while let Some(start) = lower[offset..].find(&open) {
        let start = offset + start;
        let Some(content_start) = lower[start..].find('>').map(|p| start + p + 1) else {
            break;
        };
        let Some(end) = lower[content_start..].find(&close).map(|p| content_start + p) else {
            break;
        };
        matches.push(strip_html(&html[content_start..end]));
        offset = end + close.len();
    }

    matches
}

#[async_trait]
impl Tool for ScraperTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "scraper".to_string(),
            name: "Scraper".to_string(),
            description: "Fetches a page and extracts its text content".to_string(),
            category: ToolCategory::Web,
            input_schema: json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": { "type": "string" },
                    "tag": { "type": "string" }
                }
            }),
            output_schema: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "text": { "type": "string" },
                    "matches": { "type": "array", "items": { "type": "string" } }
                }
            }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        _ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let url = require_str(&input, "url")?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                message: format!("status {status} from {url}"),
            });
        }
        let html = response.text().await?;

        match optional_str(&input, "tag") {
            Some(tag) => Ok(json!({ "url": url, "matches": extract_tag(&html, tag) })),
            None => Ok(json!({ "url": url, "text": strip_html(&html) })),
        }
    }
}

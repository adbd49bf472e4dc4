//! Minimal GitHub REST tool.

use super::{optional_str, require_str};
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

const API_BASE: &str = "https://api.github.com";

/// Read-only GitHub operations: repository metadata, issue listings,
/// and file contents.
pub struct GithubTool {
    client: reqwest::Client,
}

impl GithubTool {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Builds the API path for an operation.
fn api_path(operation: &str, owner: &str, repo: &str, path: Option<&str>) -> Result<String, ToolError> {
    match operation {
        "repo" => Ok(format!("/repos/{owner}/{repo}")),
        "issues" => Ok(format!("/repos/{owner}/{repo}/issues")),
        "file" => {
            let path = path.ok_or_else(|| ToolError::InvalidInput {
                message: "operation 'file' requires 'path'".to_string(),
            })?;
            Ok(format!("/repos/{owner}/{repo}/contents/{path}"))
        }
        other => Err(ToolError::InvalidInput {
            message: format!("unknown operation '{other}'"),
        }),
    }
}

#[async_trait]
impl Tool for GithubTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "github".to_string(),
            name: "GitHub".to_string(),
            description: "Read-only GitHub REST operations: repo, issues, file".to_string(),
            category: ToolCategory::Web,
            input_schema: json!({
                "type": "object",
                "required": ["operation", "owner", "repo"],
                "properties": {
                    "operation": { "enum": ["repo", "issues", "file"] },
                    "owner": { "type": "string" },
                    "repo": { "type": "string" },
                    "path": { "type": "string" },
                    "token": { "type": "string" }
                }
            }),
            output_schema: json!({ "description": "Parsed GitHub API response" }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        _ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let operation = require_str(&input, "operation")?;
        let owner = require_str(&input, "owner")?;
        let repo = require_str(&input, "repo")?;
        let path = api_path(operation, owner, repo, optional_str(&input, "path"))?;

        let token = optional_str(&input, "token")
            .map(str::to_string)
            .or_else(|| std::env::var("GITHUB_TOKEN").ok());

        let mut request = self
            .client
            .get(format!("{API_BASE}{path}"))
            .header("User-Agent", "flowstone")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Http {
                message: format!("status {status} from github: {body}"),
            });
        }

        Ok(response.json().await?)
    }
}

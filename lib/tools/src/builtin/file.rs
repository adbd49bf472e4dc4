//! Filesystem tool, rooted in the configured workspace directory.

use super::require_str;
use crate::context::ExecutionContext;
use crate::error::ToolError;
use crate::registry::{Tool, ToolCategory, ToolSpec};
use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::path::{Component, Path, PathBuf};

/// Reads and writes files under the workspace root.
///
/// Every path is resolved lexically against the root; absolute paths and
/// paths that traverse above the root are denied.
#[derive(Default)]
pub struct FileTool;

impl FileTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Resolves a user-supplied relative path inside the workspace root.
fn resolve(root: &Path, user_path: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(user_path);
    if candidate.is_absolute() {
        return Err(ToolError::Denied {
            reason: format!("absolute paths are not allowed: {user_path}"),
        });
    }

    let mut depth: i32 = 0;
    for component in candidate.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(ToolError::Denied {
                        reason: format!("path escapes workspace: {user_path}"),
                    });
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(ToolError::Denied {
                    reason: format!("absolute paths are not allowed: {user_path}"),
                });
            }
        }
    }

    Ok(root.join(candidate))
}

#[async_trait]
impl Tool for FileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            id: "file".to_string(),
            name: "File".to_string(),
            description: "Reads, writes, and lists files inside the workspace directory"
                .to_string(),
            category: ToolCategory::System,
            input_schema: json!({
                "type": "object",
                "required": ["operation", "path"],
                "properties": {
                    "operation": { "enum": ["read", "write", "append", "list", "exists", "delete"] },
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                }
            }),
            output_schema: json!({ "type": "object" }),
        }
    }

    async fn invoke(
        &self,
        input: JsonValue,
        ctx: &ExecutionContext,
    ) -> Result<JsonValue, ToolError> {
        let operation = require_str(&input, "operation")?;
        let user_path = require_str(&input, "path")?;
        let root = PathBuf::from(&ctx.config.workspace_dir);
        let path = resolve(&root, user_path)?;

        match operation {
            "read" => {
                let content = tokio::fs::read_to_string(&path).await?;
                Ok(json!({ "content": content }))
            }
            "write" | "append" => {
                let content = require_str(&input, "content")?;
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                if operation == "append" {
                    use tokio::io::AsyncWriteExt;
                    let mut file = tokio::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .await?;
                    file.write_all(content.as_bytes()).await?;
                } else {
                    tokio::fs::write(&path, content).await?;
                }
                Ok(json!({ "written": content.len() }))
            }
            "list" => {
                let mut entries = Vec::new();
                let mut dir = tokio::fs::read_dir(&path).await?;
                while let Some(entry) = dir.next_entry().await? {
                    entries.push(entry.file_name().to_string_lossy().into_owned());
                }
                entries.sort();
                Ok(json!({ "entries": entries }))
            }
            "exists" => {
                let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
                Ok(json!({ "exists": exists }))
            }
            "delete" => {
                let deleted = tokio::fs::remove_file(&path).await.is_ok();
                Ok(json!({ "deleted": deleted }))
            }
            other => Err(ToolError::InvalidInput {
                message: format!("unknown operation '{other}'"),
            }),
        }
    }
}

//! `flowstone init`

use super::CliError;
use flowstone_core::AppConfig;
use serde_json::json;
use std::path::Path;

const STARTER_WORKFLOW: &str = "hello-workflow.json";

pub async fn execute(config_path: &Path) -> Result<(), CliError> {
    let home = super::home_dir();
    std::fs::create_dir_all(&home)
        .map_err(|e| CliError::user(format!("failed to create {}: {e}", home.display())))?;

    if config_path.exists() {
        eprintln!("configuration already exists at {}", config_path.display());
    } else {
        let defaults = serde_json::to_string_pretty(&AppConfig::default())
            .map_err(|e| CliError::user(format!("failed to render defaults: {e}")))?;
        std::fs::write(config_path, defaults).map_err(|e| {
            CliError::user(format!("failed to write {}: {e}", config_path.display()))
        })?;
        eprintln!("wrote {}", config_path.display());
    }

    if Path::new(STARTER_WORKFLOW).exists() {
        eprintln!("{STARTER_WORKFLOW} already exists, leaving it alone");
        return Ok(());
    }

    let starter = json!({
        "id": "hello-flowstone",
        "name": "Hello flowstone",
        "description": "Doubles a number and uppercases a greeting",
        "nodes": [
            { "id": "start", "type": "input", "label": "start", "data": {} },
            {
                "id": "double",
                "type": "transform",
                "label": "double",
                "data": { "transform": "input.number * 2" }
            },
            {
                "id": "shout",
                "type": "tool",
                "label": "shout",
                "data": {
                    "toolId": "text",
                    "toolConfig": { "operation": "uppercase", "value": "hello from flowstone" }
                }
            },
            { "id": "done", "type": "output", "label": "done", "data": {} }
        ],
        "edges": [
            { "id": "e1", "source": "start", "target": "double" },
            { "id": "e2", "source": "start", "target": "shout" },
            { "id": "e3", "source": "double", "target": "done" },
            { "id": "e4", "source": "shout", "target": "done" }
        ],
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z"
    });
    let rendered = serde_json::to_string_pretty(&starter)
        .map_err(|e| CliError::user(format!("failed to render starter: {e}")))?;
    std::fs::write(STARTER_WORKFLOW, rendered)
        .map_err(|e| CliError::user(format!("failed to write {STARTER_WORKFLOW}: {e}")))?;
    eprintln!("wrote {STARTER_WORKFLOW}");
    eprintln!("try: flowstone run {STARTER_WORKFLOW} --input '{{\"number\": 21}}'");
    Ok(())
}

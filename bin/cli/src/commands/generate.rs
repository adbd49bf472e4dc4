//! `flowstone generate <prompt>`
//!
//! The generator is an opaque producer of workflow JSON: the model's
//! completion is parsed and must pass structural validation before the
//! document is accepted.

use super::CliError;
use flowstone_ai::{ChatRequest, ModelGateway};
use flowstone_core::{AppConfig, Provider};
use flowstone_workflow::definition::Workflow;
use flowstone_workflow::graph::validate_workflow;
use std::path::Path;

const SYSTEM_PROMPT: &str = "You translate automation requests into workflow documents. \
Respond with a single JSON object and nothing else. The object has keys: \
id (kebab-case string), name, description, nodes (array), edges (array), \
createdAt and updatedAt (ISO-8601). Each node has id, type, label, and data. \
Node types: input, output, agent, tool, condition, loop, parallel, merge, \
transform, prompt, code, http, sensor. Each edge has id, source, and target \
referencing node ids. The graph must be acyclic, with one input node and at \
least one output node.";

pub async fn execute(
    config_path: &Path,
    prompt: &str,
    provider: Option<&str>,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)
        .map_err(|e| CliError::user(format!("failed to load configuration: {e}")))?;

    let provider = match provider {
        Some(name) => name
            .parse::<Provider>()
            .map_err(|e| CliError::user(e.to_string()))?,
        None => config.default_provider,
    };

    let gateway = ModelGateway::new(&config);
    let request = ChatRequest::new(provider, config.default_model.clone(), prompt)
        .with_system(SYSTEM_PROMPT)
        .with_temperature(0.2);

    let completion = gateway
        .chat(&request)
        .await
        .map_err(|e| CliError::user(format!("generation failed: {e}")))?;

    let document = strip_code_fence(&completion);
    let workflow: Workflow = serde_json::from_str(document)
        .map_err(|e| CliError::user(format!("generator produced invalid JSON: {e}")))?;
    validate_workflow(&workflow)
        .map_err(|e| CliError::user(format!("generated workflow rejected: {e}")))?;

    let rendered = serde_json::to_string_pretty(&workflow)
        .map_err(|e| CliError::user(format!("failed to render document: {e}")))?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .map_err(|e| CliError::user(format!("failed to write {}: {e}", path.display())))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Tolerates a fenced code block around the JSON document.
fn strip_code_fence(completion: &str) -> &str {
    let trimmed = completion.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence.
    let inner = inner.find('\n').map_or("", |pos| &inner[pos + 1..]);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_handles_plain_and_fenced() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }
}

//! `flowstone run <workflow-file>`

use super::CliError;
use flowstone_ai::ModelGateway;
use flowstone_core::AppConfig;
use flowstone_engine::engine::{BroadcastSink, Engine};
use flowstone_engine::error::EngineError;
use flowstone_store::{SqliteStore, Store};
use flowstone_tools::ToolRegistry;
use flowstone_workflow::definition::{Workflow, WorkflowUpdate};
use flowstone_workflow::event::ExecutionEvent;
use flowstone_workflow::execution::ExecutionStatus;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;

pub async fn execute(
    config_path: &Path,
    workflow_file: &Path,
    input: Option<&str>,
    input_file: Option<&Path>,
    output: Option<&Path>,
    verbose: bool,
) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)
        .map_err(|e| CliError::user(format!("failed to load configuration: {e}")))?;

    let document = std::fs::read_to_string(workflow_file).map_err(|e| {
        CliError::user(format!(
            "failed to read workflow file {}: {e}",
            workflow_file.display()
        ))
    })?;
    let workflow: Workflow = serde_json::from_str(&document)
        .map_err(|e| CliError::user(format!("invalid workflow document: {e}")))?;

    let input_value = read_input(input, input_file)?;

    let home = super::home_dir();
    std::fs::create_dir_all(&home)
        .map_err(|e| CliError::user(format!("failed to create {}: {e}", home.display())))?;
    let store = Arc::new(
        SqliteStore::connect(&super::database_path())
            .await
            .map_err(|e| CliError::user(format!("failed to open database: {e}")))?,
    );

    // Upsert the document so the execution is attributable later.
    let existing = store
        .get_workflow(&workflow.id)
        .await
        .map_err(|e| CliError::user(e.to_string()))?;
    if existing.is_some() {
        store
            .update_workflow(
                &workflow.id,
                WorkflowUpdate {
                    name: Some(workflow.name.clone()),
                    description: workflow.description.clone(),
                    nodes: Some(workflow.nodes.clone()),
                    edges: Some(workflow.edges.clone()),
                    variables: workflow.variables.clone(),
                    metadata: workflow.metadata.clone(),
                },
            )
            .await
            .map_err(|e| CliError::user(e.to_string()))?;
    } else {
        store
            .create_workflow(&workflow)
            .await
            .map_err(|e| CliError::user(e.to_string()))?;
    }

    let config = Arc::new(config);
    let sink = Arc::new(BroadcastSink::new(1024));
    let mut events = sink.subscribe();
    let engine = Engine::new(
        store,
        Arc::new(ToolRegistry::with_builtins()),
        Arc::new(ModelGateway::new(&config)),
        Arc::clone(&config),
        Arc::clone(&sink) as _,
    );

    let execution = engine
        .execute_workflow(&workflow.id, input_value)
        .await
        .map_err(|e| match e {
            EngineError::Validation(inner) => {
                CliError::user(format!("workflow validation failed: {inner}"))
            }
            other => CliError::user(other.to_string()),
        })?;

    let printer = verbose.then(|| {
        tokio::spawn(async move {
            while let Ok((_, event)) = events.recv().await {
                print_event(&event);
                if event.name().starts_with("execution:") {
                    break;
                }
            }
        })
    });

    let final_execution = engine
        .wait_for(execution.id)
        .await
        .map_err(|e| CliError::user(e.to_string()))?;
    if let Some(printer) = printer {
        printer.abort();
    }

    match final_execution.status {
        ExecutionStatus::Completed => {
            let result = final_execution.output.unwrap_or(JsonValue::Null);
            let rendered = serde_json::to_string_pretty(&result)
                .unwrap_or_else(|_| result.to_string());
            match output {
                Some(path) => std::fs::write(path, rendered).map_err(|e| {
                    CliError::user(format!("failed to write {}: {e}", path.display()))
                })?,
                None => println!("{rendered}"),
            }
            Ok(())
        }
        ExecutionStatus::Stopped => Err(CliError::execution("execution was stopped".to_string())),
        _ => Err(CliError::execution(
            final_execution
                .error
                .unwrap_or_else(|| "unknown failure".to_string()),
        )),
    }
}

fn read_input(inline: Option<&str>, file: Option<&Path>) -> Result<JsonValue, CliError> {
    if let Some(inline) = inline {
        return serde_json::from_str(inline)
            .map_err(|e| CliError::user(format!("--input is not valid JSON: {e}")));
    }
    if let Some(path) = file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::user(format!("failed to read {}: {e}", path.display())))?;
        return serde_json::from_str(&text)
            .map_err(|e| CliError::user(format!("input file is not valid JSON: {e}")));
    }
    Ok(JsonValue::Null)
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::NodeStart { node_id, kind } => {
            eprintln!("▶ {node_id} ({kind})");
        }
        ExecutionEvent::NodeComplete { node_id, .. } => {
            eprintln!("✓ {node_id}");
        }
        ExecutionEvent::NodeError { node_id, error } => {
            eprintln!("✗ {node_id}: {error}");
        }
        ExecutionEvent::ExecutionComplete { .. } => eprintln!("execution complete"),
        ExecutionEvent::ExecutionError { error } => eprintln!("execution error: {error}"),
        ExecutionEvent::Log {
            level,
            node_id,
            message,
            ..
        } => match node_id {
            Some(node_id) => eprintln!("  [{level:?}] {node_id}: {message}"),
            None => eprintln!("  [{level:?}] {message}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_input_parses_json() {
        assert_eq!(read_input(Some("3"), None).unwrap(), serde_json::json!(3));
        assert!(read_input(Some("not json"), None).is_err());
    }

    #[test]
    fn missing_input_defaults_to_null() {
        assert_eq!(read_input(None, None).unwrap(), JsonValue::Null);
    }

    #[test]
    fn input_file_is_read_and_parsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{ "n": 4 }"#).expect("write");
        assert_eq!(
            read_input(None, Some(&path)).unwrap(),
            serde_json::json!({ "n": 4 })
        );
    }
}

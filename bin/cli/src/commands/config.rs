//! `flowstone config`
//!
//! Reads and edits the configuration document in place, preserving keys
//! this build does not know about.

use super::CliError;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use std::path::Path;

pub async fn execute(
    config_path: &Path,
    set: Option<&str>,
    get: Option<&str>,
    api_key: Option<&str>,
    show: bool,
) -> Result<(), CliError> {
    let mut document = read_document(config_path)?;

    if let Some(assignment) = set {
        let (key, value) = split_assignment(assignment)?;
        document.insert(key.to_string(), parse_value(value));
        write_document(config_path, &document)?;
        eprintln!("set {key}");
        return Ok(());
    }

    if let Some(assignment) = api_key {
        let (provider, key) = split_assignment(assignment)?;
        let providers = document
            .entry("providers".to_string())
            .or_insert_with(|| json!({}));
        if !providers.is_object() {
            return Err(CliError::user("'providers' is not an object"));
        }
        providers[provider] = json!({ "apiKey": key });
        write_document(config_path, &document)?;
        eprintln!("set API key for {provider}");
        return Ok(());
    }

    if let Some(key) = get {
        match document.get(key) {
            Some(value) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
                );
                return Ok(());
            }
            None => return Err(CliError::user(format!("key not set: {key}"))),
        }
    }

    if show {
        let redacted = redact(&JsonValue::Object(document));
        println!(
            "{}",
            serde_json::to_string_pretty(&redacted).unwrap_or_default()
        );
        return Ok(());
    }

    Err(CliError::user(
        "nothing to do: pass --set, --get, --api-key, or --show",
    ))
}

fn read_document(path: &Path) -> Result<JsonMap<String, JsonValue>, CliError> {
    if !path.exists() {
        return Ok(JsonMap::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::user(format!("failed to read {}: {e}", path.display())))?;
    match serde_json::from_str(&text) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::user("configuration is not a JSON object")),
        Err(e) => Err(CliError::user(format!("invalid configuration: {e}"))),
    }
}

fn write_document(path: &Path, document: &JsonMap<String, JsonValue>) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CliError::user(format!("failed to create {}: {e}", parent.display())))?;
    }
    let rendered = serde_json::to_string_pretty(document)
        .map_err(|e| CliError::user(format!("failed to render configuration: {e}")))?;
    std::fs::write(path, rendered)
        .map_err(|e| CliError::user(format!("failed to write {}: {e}", path.display())))
}

fn split_assignment(assignment: &str) -> Result<(&str, &str), CliError> {
    assignment
        .split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| CliError::user(format!("expected key=value, got '{assignment}'")))
}

/// Values parse as JSON when they can, and fall back to plain strings,
/// so `--set maxRetries=5` and `--set defaultModel=gpt-4o-mini` both
/// do what they look like.
fn parse_value(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn redact(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let redacted = map
                .iter()
                .map(|(k, v)| {
                    if k == "apiKey" && v.is_string() {
                        (k.clone(), JsonValue::String("********".to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect();
            JsonValue::Object(redacted)
        }
        other => other.clone(),
    }
}

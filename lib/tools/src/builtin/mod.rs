//! The built-in tool set.

mod browser;
mod code_runner;
mod file;
mod github;
mod http;
mod json;
mod python;
mod scraper;
mod shell;
mod text;

pub use browser::BrowserTool;
pub use code_runner::CodeRunnerTool;
pub use file::FileTool;
pub use github::GithubTool;
pub use http::HttpTool;
pub use json::JsonTool;
pub use python::PythonTool;
pub use scraper::ScraperTool;
pub use shell::ShellTool;
pub use text::TextTool;

use crate::error::ToolError;
use crate::registry::Tool;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Literal framing markers used by the subprocess evaluation protocol:
/// the wrapper script prints the `result` binding as JSON between them.
pub const RESULT_BEGIN: &str = "__RESULT_BEGIN__";
pub const RESULT_END: &str = "__RESULT_END__";

/// Constructs the full built-in set.
#[must_use]
pub fn all() -> Vec<Arc<dyn Tool>> {
    let client = reqwest::Client::new();
    vec![
        Arc::new(HttpTool::new(client.clone())),
        Arc::new(BrowserTool::new(client.clone())),
        Arc::new(ScraperTool::new(client.clone())),
        Arc::new(GithubTool::new(client)),
        Arc::new(FileTool::new()),
        Arc::new(ShellTool::new()),
        Arc::new(PythonTool::new()),
        Arc::new(CodeRunnerTool::new()),
        Arc::new(JsonTool::new()),
        Arc::new(TextTool::new()),
    ]
}

/// Extracts and parses the framed JSON payload from subprocess stdout.
pub(crate) fn extract_framed(stdout: &str) -> Result<JsonValue, ToolError> {
    let begin = stdout.find(RESULT_BEGIN).ok_or_else(|| ToolError::Parse {
        message: "output frame start marker not found".to_string(),
    })?;
    let after_begin = begin + RESULT_BEGIN.len();
    let end = stdout[after_begin..]
        .find(RESULT_END)
        .ok_or_else(|| ToolError::Parse {
            message: "output frame end marker not found".to_string(),
        })?;
    let payload = stdout[after_begin..after_begin + end].trim();
    if payload.is_empty() {
        return Ok(JsonValue::Null);
    }
    serde_json::from_str(payload).map_err(|e| ToolError::Parse {
        message: format!("framed payload is not valid JSON: {e}"),
    })
}

/// Returns a required string field from the input record.
pub(crate) fn require_str<'a>(input: &'a JsonValue, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| ToolError::InvalidInput {
            message: format!("missing required string field '{key}'"),
        })
}

/// Returns an optional string field from the input record.
pub(crate) fn optional_str<'a>(input: &'a JsonValue, key: &str) -> Option<&'a str> {
    input.get(key).and_then(JsonValue::as_str)
}

/// Returns an optional integer field from the input record.
pub(crate) fn optional_u64(input: &JsonValue, key: &str) -> Option<u64> {
    input.get(key).and_then(JsonValue::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_framed_happy_path() {
        let stdout = format!("debug noise\n{RESULT_BEGIN}\n{{\"x\": 1}}\n{RESULT_END}\ntrailer");
        let value = extract_framed(&stdout).expect("framed value");
        assert_eq!(value, serde_json::json!({ "x": 1 }));
    }

    #[test]
    fn extract_framed_empty_payload_is_null() {
        let stdout = format!("{RESULT_BEGIN}\n{RESULT_END}");
        assert_eq!(extract_framed(&stdout).unwrap(), JsonValue::Null);
    }

    #[test]
    fn extract_framed_missing_marker_is_parse_error() {
        let err = extract_framed("no markers here").unwrap_err();
        assert!(matches!(err, ToolError::Parse { .. }));
    }

    #[test]
    fn require_str_reports_missing_field() {
        let err = require_str(&serde_json::json!({}), "url").unwrap_err();
        assert!(err.to_string().contains("url"));
    }
}

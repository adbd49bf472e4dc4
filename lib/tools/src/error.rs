//! Error types for tool invocations.

use std::fmt;

/// Errors from tool invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The input record is missing a field or has the wrong shape.
    InvalidInput { message: String },
    /// The sandbox refused the operation (e.g. path traversal).
    Denied { reason: String },
    /// Filesystem operation failed.
    Io { message: String },
    /// HTTP transport or status failure.
    Http { message: String },
    /// Subprocess could not be spawned or crashed.
    Subprocess { message: String },
    /// The invocation deadline elapsed.
    Timeout { after_ms: u64 },
    /// Output (or embedded JSON) could not be parsed.
    Parse { message: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { message } => write!(f, "invalid tool input: {message}"),
            Self::Denied { reason } => write!(f, "sandbox denied: {reason}"),
            Self::Io { message } => write!(f, "io error: {message}"),
            Self::Http { message } => write!(f, "http error: {message}"),
            Self::Subprocess { message } => write!(f, "subprocess error: {message}"),
            Self::Timeout { after_ms } => write!(f, "tool timed out after {after_ms}ms"),
            Self::Parse { message } => write!(f, "parse error: {message}"),
        }
    }
}

impl std::error::Error for ToolError {}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            message: e.to_string(),
        }
    }
}

//! Tool registry and built-in tool capabilities.
//!
//! A tool is a capability keyed by id: a declared input/output schema
//! plus an `invoke` operation. The registry is populated at process
//! startup with the built-in set and is read-only afterwards.
//!
//! Built-ins: `browser`, `scraper`, `http`, `file`, `python`,
//! `code-runner`, `github`, `shell`, `json`, `text`.

pub mod builtin;
pub mod context;
pub mod error;
pub mod registry;

pub use context::ExecutionContext;
pub use error::ToolError;
pub use registry::{Tool, ToolCategory, ToolRegistry, ToolSpec};

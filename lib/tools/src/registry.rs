//! The tool catalog.

use crate::context::ExecutionContext;
use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Broad grouping of tool capabilities, for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Network-facing tools (http, browser, scraper, github).
    Web,
    /// Host-facing tools (file, shell).
    System,
    /// Code evaluation tools (python, code-runner).
    Code,
    /// Pure data tools (json, text).
    Data,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Web => "web",
            Self::System => "system",
            Self::Code => "code",
            Self::Data => "data",
        };
        f.write_str(name)
    }
}

/// Declared capability of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// Registry key.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    pub category: ToolCategory,
    /// JSON schema of the accepted input record.
    pub input_schema: JsonValue,
    /// JSON schema of the produced output.
    pub output_schema: JsonValue,
}

/// A tool capability: a declared spec plus an invoke operation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the declared capability of this tool.
    fn spec(&self) -> ToolSpec;

    /// Invokes the tool.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] describing the failure; the enclosing
    /// node fails with it.
    async fn invoke(&self, input: JsonValue, ctx: &ExecutionContext)
    -> Result<JsonValue, ToolError>;
}

/// Catalog of tool capabilities keyed by tool id.
///
/// Populated at process startup; read-only during execution.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry populated with the built-in tool set.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in crate::builtin::all() {
            registry.register(tool);
        }
        registry
    }

    /// Registers a tool under its spec id, replacing any previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.spec().id, tool);
    }

    /// Returns the tool registered under the given id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).cloned()
    }

    /// Returns true if a tool is registered under the given id.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Returns all tool specs, sorted by id.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        specs
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

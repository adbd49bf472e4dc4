//! Workflow node types and per-kind data records.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - A unique ID within the workflow
//! - A kind from the closed set (input, agent, tool, condition, ...)
//! - A display label and an optional layout hint
//! - A kind-specific data record
//!
//! On the wire the kind lives in the node's `type` field and the record
//! in its `data` field; [`NodeData`] is the discriminated union over
//! both. Unknown `data` keys are preserved verbatim through the
//! flattened `extra` maps so the store can round-trip documents the
//! dispatcher does not understand.

use flowstone_core::{NodeId, Provider};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;
use std::fmt;

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Input,
    Output,
    Agent,
    Tool,
    Condition,
    Loop,
    Parallel,
    Merge,
    Transform,
    Prompt,
    Code,
    Http,
    Sensor,
}

impl NodeKind {
    /// Returns the lowercase wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::Condition => "condition",
            Self::Loop => "loop",
            Self::Parallel => "parallel",
            Self::Merge => "merge",
            Self::Transform => "transform",
            Self::Prompt => "prompt",
            Self::Code => "code",
            Self::Http => "http",
            Self::Sensor => "sensor",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A layout hint from the visual editor. Ignored by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Data record for `input` nodes. Carries no required fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `output` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `agent` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentData {
    /// Provider to route the call through. Falls back to the configured
    /// default when absent.
    pub provider: Option<Provider>,
    /// Model identifier. Falls back to the configured default.
    pub model: Option<String>,
    /// System prompt for the call.
    pub system_prompt: Option<String>,
    /// Sampling temperature, 0.0 to 2.0.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `tool` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolData {
    /// Registry id of the tool to invoke.
    pub tool_id: Option<String>,
    /// Static configuration merged with the gathered input.
    pub tool_config: Option<JsonMap<String, JsonValue>>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `condition` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionData {
    /// Expression evaluated over the gathered input; result is a boolean.
    pub condition: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// The iteration style of a `loop` node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopKind {
    #[default]
    For,
    ForEach,
    While,
}

/// Iteration parameters for a `loop` node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopConfig {
    /// Iteration count for `for` loops.
    pub count: Option<u64>,
    /// Continuation expression for `while` loops.
    pub condition: Option<String>,
    /// Explicit item list overriding the gathered input for `forEach`.
    pub items: Option<JsonValue>,
}

/// Data record for `loop` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopData {
    pub loop_type: LoopKind,
    pub loop_config: LoopConfig,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `parallel` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParallelData {
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `merge` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeData {
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `transform` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformData {
    /// Expression evaluated over the gathered input.
    pub transform: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `prompt` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptData {
    /// Template with `{{input}}` and `{{name}}` placeholders.
    pub prompt_template: Option<String>,
    /// Input-record field names substitutable into the template.
    pub variables: Vec<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Source language of a `code` node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    #[default]
    Javascript,
    Typescript,
    Python,
}

/// Data record for `code` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeData {
    pub language: CodeLanguage,
    /// User source. Evaluated as a function body; its return value is
    /// the node output.
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// HTTP method for `http` nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Returns the uppercase wire name of this method.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

/// Data record for `http` nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpData {
    /// Request URL; `{{name}}` placeholders interpolate from the input record.
    pub url: Option<String>,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    /// Request body; `{{name}}` placeholders interpolate when it is a string.
    pub body: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Data record for `sensor` nodes. Opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// The discriminated union of per-kind data records.
///
/// Serialized adjacently: the variant name lands in the node's `type`
/// field and the record in its `data` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NodeData {
    Input(InputData),
    Output(OutputData),
    Agent(AgentData),
    Tool(ToolData),
    Condition(ConditionData),
    Loop(LoopData),
    Parallel(ParallelData),
    Merge(MergeData),
    Transform(TransformData),
    Prompt(PromptData),
    Code(CodeData),
    Http(HttpData),
    Sensor(SensorData),
}

impl NodeData {
    /// Returns the kind tag of this record.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Input(_) => NodeKind::Input,
            Self::Output(_) => NodeKind::Output,
            Self::Agent(_) => NodeKind::Agent,
            Self::Tool(_) => NodeKind::Tool,
            Self::Condition(_) => NodeKind::Condition,
            Self::Loop(_) => NodeKind::Loop,
            Self::Parallel(_) => NodeKind::Parallel,
            Self::Merge(_) => NodeKind::Merge,
            Self::Transform(_) => NodeKind::Transform,
            Self::Prompt(_) => NodeKind::Prompt,
            Self::Code(_) => NodeKind::Code,
            Self::Http(_) => NodeKind::Http,
            Self::Sensor(_) => NodeKind::Sensor,
        }
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Human-readable label. Multi-parent fan-in keys on it.
    #[serde(default)]
    pub label: String,
    /// Editor layout hint; the runtime ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Kind tag and kind-specific data record.
    #[serde(flatten)]
    pub data: NodeData,
}

impl Node {
    /// Creates a new node.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, label: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            position: None,
            data,
        }
    }

    /// Returns the kind of this node.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    /// Returns the label, falling back to the node id when empty.
    ///
    /// This is the key used for multi-parent fan-in and multi-output
    /// result maps.
    #[must_use]
    pub fn label_or_id(&self) -> &str {
        if self.label.is_empty() {
            self.id.as_str()
        } else {
            &self.label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&NodeKind::Transform).unwrap(),
            "\"transform\""
        );
        assert!(serde_json::from_str::<NodeKind>("\"webhook\"").is_err());
    }

    #[test]
    fn node_document_shape() {
        let json = r#"{
            "id": "b",
            "type": "transform",
            "label": "double",
            "position": { "x": 100.0, "y": 40.0 },
            "data": { "transform": "input * 2" }
        }"#;
        let node: Node = serde_json::from_str(json).expect("deserialize");
        assert_eq!(node.id, "b");
        assert_eq!(node.kind(), NodeKind::Transform);
        match &node.data {
            NodeData::Transform(data) => {
                assert_eq!(data.transform.as_deref(), Some("input * 2"));
            }
            other => panic!("unexpected data: {other:?}"),
        }
    }

    #[test]
    fn unknown_data_fields_are_preserved() {
        let json = r#"{
            "id": "t",
            "type": "tool",
            "label": "fetch",
            "data": { "toolId": "http", "editorHint": "wide" }
        }"#;
        let node: Node = serde_json::from_str(json).expect("deserialize");
        let NodeData::Tool(data) = &node.data else {
            panic!("expected tool data");
        };
        assert_eq!(data.tool_id.as_deref(), Some("http"));
        assert_eq!(
            data.extra.get("editorHint"),
            Some(&JsonValue::String("wide".to_string()))
        );

        // Round-trips verbatim.
        let out = serde_json::to_value(&node).expect("serialize");
        assert_eq!(out["data"]["editorHint"], "wide");
    }

    #[test]
    fn loop_type_wire_names() {
        let data: LoopData =
            serde_json::from_str(r#"{ "loopType": "forEach", "loopConfig": {} }"#).unwrap();
        assert_eq!(data.loop_type, LoopKind::ForEach);
        let data: LoopData = serde_json::from_str(r#"{ "loopType": "while" }"#).unwrap();
        assert_eq!(data.loop_type, LoopKind::While);
    }

    #[test]
    fn agent_data_parses_selected_keys() {
        let json = r#"{
            "provider": "anthropic",
            "model": "claude-sonnet-4-5",
            "systemPrompt": "Be terse.",
            "temperature": 0.2,
            "maxTokens": 512
        }"#;
        let data: AgentData = serde_json::from_str(json).expect("deserialize");
        assert_eq!(data.provider, Some(Provider::Anthropic));
        assert_eq!(data.max_tokens, Some(512));
        assert_eq!(data.system_prompt.as_deref(), Some("Be terse."));
    }

    #[test]
    fn http_method_uppercase() {
        let data: HttpData =
            serde_json::from_str(r#"{ "url": "http://x", "method": "PATCH" }"#).unwrap();
        assert_eq!(data.method, HttpMethod::Patch);
        assert_eq!(data.method.as_str(), "PATCH");
    }

    #[test]
    fn label_or_id_falls_back() {
        let node = Node::new("n1", "", NodeData::Merge(MergeData::default()));
        assert_eq!(node.label_or_id(), "n1");
        let node = Node::new("n1", "joiner", NodeData::Merge(MergeData::default()));
        assert_eq!(node.label_or_id(), "joiner");
    }
}

//! Per-node-type execution semantics.
//!
//! The dispatcher receives a node, its gathered input value, and an
//! execution context; it returns the node's output value or fails. A
//! dispatch failure is fatal to the enclosing execution (fail-fast).
//!
//! Cancellation is observed cooperatively: between loop iterations and
//! after awaited I/O. A dispatch that observes the flag returns
//! [`DispatchError::Cancelled`]; the runner records the node as skipped
//! rather than failed.

use crate::error::DispatchError;
use crate::expr::ExpressionEvaluator;
use crate::template::{interpolate, render_prompt, stringify};
use flowstone_ai::{ChatRequest, ModelGateway};
use flowstone_tools::{ExecutionContext, ToolRegistry};
use flowstone_workflow::node::{
    AgentData, CodeData, CodeLanguage, HttpData, LoopData, LoopKind, Node, NodeData, ToolData,
};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Safety cap on loop iterations; `while` loops cannot exceed it.
const MAX_LOOP_ITERATIONS: u64 = 1000;

/// Realizes a single node's semantics.
pub struct NodeDispatcher {
    registry: Arc<ToolRegistry>,
    gateway: Arc<ModelGateway>,
    evaluator: ExpressionEvaluator,
}

impl NodeDispatcher {
    /// Creates a dispatcher over the given collaborators.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, gateway: Arc<ModelGateway>) -> Self {
        Self {
            registry,
            gateway,
            evaluator: ExpressionEvaluator::default(),
        }
    }

    /// Executes one node: gathered input in, output value out.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`]; the runner turns it into a
    /// `node:error` event and aborts the execution.
    pub async fn dispatch(
        &self,
        node: &Node,
        input: JsonValue,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, DispatchError> {
        match &node.data {
            // The gathered input of an upstream-less node is the
            // execution's input record, which is exactly this node's
            // output.
            NodeData::Input(_) => Ok(input),
            NodeData::Output(_) | NodeData::Parallel(_) => Ok(input),
            NodeData::Agent(data) => self.dispatch_agent(node, data, input, ctx, cancel).await,
            NodeData::Tool(data) => self.dispatch_tool(node, data, input, ctx, cancel).await,
            NodeData::Condition(data) => {
                let expression = data.condition.as_deref().ok_or_else(|| {
                    DispatchError::MissingNodeData {
                        node_id: node.id.clone(),
                        field: "condition",
                    }
                })?;
                let value = self.evaluator.eval_condition(expression, &input).await?;
                Ok(JsonValue::Bool(value))
            }
            NodeData::Loop(data) => self.dispatch_loop(node, data, input, cancel).await,
            NodeData::Merge(_) => Ok(flatten_once(input)),
            NodeData::Transform(data) => {
                let expression = data.transform.as_deref().ok_or_else(|| {
                    DispatchError::MissingNodeData {
                        node_id: node.id.clone(),
                        field: "transform",
                    }
                })?;
                Ok(self.evaluator.eval_expression(expression, &input).await?)
            }
            NodeData::Prompt(data) => {
                let template = data.prompt_template.as_deref().ok_or_else(|| {
                    DispatchError::MissingNodeData {
                        node_id: node.id.clone(),
                        field: "promptTemplate",
                    }
                })?;
                Ok(JsonValue::String(render_prompt(
                    template,
                    &input,
                    &data.variables,
                )))
            }
            NodeData::Code(data) => self.dispatch_code(node, data, input, ctx, cancel).await,
            NodeData::Http(data) => self.dispatch_http(node, data, input, ctx, cancel).await,
            NodeData::Sensor(data) => {
                // Out of core: delegated to a registered `sensor` tool.
                let tool =
                    self.registry
                        .get("sensor")
                        .ok_or_else(|| DispatchError::UnknownTool {
                            tool_id: "sensor".to_string(),
                        })?;
                let mut merged = data.extra.clone();
                merged.insert("input".to_string(), input);
                let output = tool.invoke(JsonValue::Object(merged), ctx).await?;
                check_cancel(cancel)?;
                Ok(output)
            }
        }
    }

    async fn dispatch_agent(
        &self,
        _node: &Node,
        data: &AgentData,
        input: JsonValue,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, DispatchError> {
        let provider = data.provider.unwrap_or(ctx.config.default_provider);
        let model = data
            .model
            .clone()
            .unwrap_or_else(|| ctx.config.default_model.clone());

        // Non-string inputs are serialized to JSON for the user prompt.
        let mut request = ChatRequest::new(provider, model, stringify(&input));
        if let Some(system) = &data.system_prompt {
            request = request.with_system(system.clone());
        }
        if let Some(temperature) = data.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = data.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let completion = self.gateway.chat(&request).await?;
        check_cancel(cancel)?;
        Ok(JsonValue::String(completion))
    }

    async fn dispatch_tool(
        &self,
        node: &Node,
        data: &ToolData,
        input: JsonValue,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, DispatchError> {
        let tool_id = data
            .tool_id
            .as_deref()
            .ok_or_else(|| DispatchError::MissingToolId {
                node_id: node.id.clone(),
            })?;
        let tool = self
            .registry
            .get(tool_id)
            .ok_or_else(|| DispatchError::UnknownTool {
                tool_id: tool_id.to_string(),
            })?;

        let mut merged = data.tool_config.clone().unwrap_or_default();
        merged.insert("input".to_string(), input);

        let output = tool.invoke(JsonValue::Object(merged), ctx).await?;
        check_cancel(cancel)?;
        Ok(output)
    }

    async fn dispatch_loop(
        &self,
        node: &Node,
        data: &LoopData,
        input: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, DispatchError> {
        match data.loop_type {
            LoopKind::For => {
                let count =
                    data.loop_config
                        .count
                        .ok_or_else(|| DispatchError::MissingNodeData {
                            node_id: node.id.clone(),
                            field: "loopConfig.count",
                        })?;
                let mut items = Vec::new();
                for index in 0..count {
                    check_cancel(cancel)?;
                    items.push(json!({ "index": index, "input": input }));
                }
                Ok(JsonValue::Array(items))
            }
            LoopKind::ForEach => {
                let source = data
                    .loop_config
                    .items
                    .clone()
                    .unwrap_or_else(|| input.clone());
                let items = match source {
                    JsonValue::Array(items) => items,
                    other => vec![other],
                };
                // The item list is the node's single downstream value;
                // there is no per-iteration fan-out in the core.
                for _ in &items {
                    check_cancel(cancel)?;
                }
                Ok(JsonValue::Array(items))
            }
            LoopKind::While => {
                let condition = data.loop_config.condition.as_deref().ok_or_else(|| {
                    DispatchError::MissingNodeData {
                        node_id: node.id.clone(),
                        field: "loopConfig.condition",
                    }
                })?;
                let mut items = Vec::new();
                for index in 0..MAX_LOOP_ITERATIONS {
                    check_cancel(cancel)?;
                    if !self.evaluator.eval_condition(condition, &input).await? {
                        break;
                    }
                    items.push(json!({ "index": index, "input": input }));
                }
                Ok(JsonValue::Array(items))
            }
        }
    }

    async fn dispatch_code(
        &self,
        node: &Node,
        data: &CodeData,
        input: JsonValue,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, DispatchError> {
        let code = data
            .code
            .as_deref()
            .ok_or_else(|| DispatchError::MissingNodeData {
                node_id: node.id.clone(),
                field: "code",
            })?;

        match data.language {
            CodeLanguage::Javascript | CodeLanguage::Typescript => {
                let context = json!({
                    "executionId": ctx.execution_id.to_string(),
                    "workflowId": ctx.workflow_id,
                    "nodeId": ctx.node_id,
                    "variables": ctx.variables,
                });
                Ok(self.evaluator.eval_function(code, &input, &context).await?)
            }
            CodeLanguage::Python => {
                let tool =
                    self.registry
                        .get("python")
                        .ok_or_else(|| DispatchError::UnknownTool {
                            tool_id: "python".to_string(),
                        })?;
                let output = tool
                    .invoke(json!({ "code": code, "input": input }), ctx)
                    .await?;
                check_cancel(cancel)?;
                Ok(output)
            }
        }
    }

    async fn dispatch_http(
        &self,
        node: &Node,
        data: &HttpData,
        input: JsonValue,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<JsonValue, DispatchError> {
        let url = data
            .url
            .as_deref()
            .ok_or_else(|| DispatchError::MissingNodeData {
                node_id: node.id.clone(),
                field: "url",
            })?;

        // Interpolate, then delegate to the single HTTP implementation.
        let mut request = JsonMap::new();
        request.insert(
            "url".to_string(),
            JsonValue::String(interpolate(url, &input)),
        );
        request.insert(
            "method".to_string(),
            JsonValue::String(data.method.as_str().to_string()),
        );
        if !data.headers.is_empty() {
            let headers: JsonMap<String, JsonValue> = data
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect();
            request.insert("headers".to_string(), JsonValue::Object(headers));
        }
        if let Some(body) = &data.body {
            let body = match body {
                JsonValue::String(text) => JsonValue::String(interpolate(text, &input)),
                other => other.clone(),
            };
            request.insert("body".to_string(), body);
        }

        let tool = self
            .registry
            .get("http")
            .ok_or_else(|| DispatchError::UnknownTool {
                tool_id: "http".to_string(),
            })?;
        let output = tool.invoke(JsonValue::Object(request), ctx).await?;
        check_cancel(cancel)?;
        Ok(output)
    }
}

/// Returns one level of flattening for sequences; other values pass
/// through unchanged.
fn flatten_once(input: JsonValue) -> JsonValue {
    match input {
        JsonValue::Array(items) => {
            let mut flattened = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    JsonValue::Array(inner) => flattened.extend(inner),
                    other => flattened.push(other),
                }
            }
            JsonValue::Array(flattened)
        }
        other => other,
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), DispatchError> {
    if cancel.is_cancelled() {
        return Err(DispatchError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowstone_ai::backend::ChatBackend;
    use flowstone_ai::error::AiError;
    use flowstone_core::{AppConfig, ExecutionId, Provider};
    use flowstone_workflow::event::EventEmitter;
    use flowstone_workflow::node::{
        ConditionData, InputData, LoopConfig, MergeData, PromptData, TransformData,
    };

    struct EchoBackend;

    #[async_trait]
    impl ChatBackend for EchoBackend {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn chat(
            &self,
            request: &ChatRequest,
            _api_key: Option<&str>,
        ) -> Result<String, AiError> {
            Ok(format!("echo: {}", request.prompt))
        }
    }

    fn dispatcher() -> NodeDispatcher {
        let config = AppConfig::default();
        let mut gateway = ModelGateway::new(&config);
        gateway.set_backend(Box::new(EchoBackend));
        NodeDispatcher::new(
            Arc::new(ToolRegistry::with_builtins()),
            Arc::new(gateway),
        )
    }

    fn context() -> ExecutionContext {
        let (emitter, _rx) = EventEmitter::channel();
        ExecutionContext::new(
            ExecutionId::new(),
            "wf-1".into(),
            "n1".into(),
            JsonMap::new(),
            Arc::new(AppConfig::default()),
            emitter,
        )
    }

    fn node(id: &str, data: NodeData) -> Node {
        Node::new(id, id, data)
    }

    #[tokio::test]
    async fn input_and_output_pass_through() {
        let dispatcher = dispatcher();
        let ctx = context();
        let cancel = CancellationToken::new();

        let out = dispatcher
            .dispatch(
                &node("a", NodeData::Input(InputData::default())),
                json!(3),
                &ctx,
                &cancel,
            )
            .await
            .expect("input");
        assert_eq!(out, json!(3));

        let out = dispatcher
            .dispatch(
                &node("z", NodeData::Output(Default::default())),
                json!({ "left": 5 }),
                &ctx,
                &cancel,
            )
            .await
            .expect("output");
        assert_eq!(out, json!({ "left": 5 }));
    }

    #[tokio::test]
    async fn transform_evaluates_expression() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "b",
                    NodeData::Transform(TransformData {
                        transform: Some("input * 2".to_string()),
                        ..TransformData::default()
                    }),
                ),
                json!(3),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("transform");
        assert_eq!(out, json!(6));
    }

    #[tokio::test]
    async fn transform_without_expression_is_missing_data() {
        let err = dispatcher()
            .dispatch(
                &node("b", NodeData::Transform(TransformData::default())),
                json!(3),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::MissingNodeData {
                node_id: "b".into(),
                field: "transform"
            }
        );
    }

    #[tokio::test]
    async fn condition_yields_boolean() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "c",
                    NodeData::Condition(ConditionData {
                        condition: Some("input.score > 0.5".to_string()),
                        ..ConditionData::default()
                    }),
                ),
                json!({ "score": 0.9 }),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("condition");
        assert_eq!(out, json!(true));
    }

    #[tokio::test]
    async fn agent_serializes_input_and_returns_completion() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "agent",
                    NodeData::Agent(AgentData {
                        provider: Some(Provider::OpenAi),
                        model: Some("test-model".to_string()),
                        ..AgentData::default()
                    }),
                ),
                json!({ "q": 1 }),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("agent");
        assert_eq!(out, json!("echo: {\"q\":1}"));
    }

    #[tokio::test]
    async fn tool_node_merges_config_with_input() {
        let mut tool_config = JsonMap::new();
        tool_config.insert("operation".to_string(), json!("keys"));
        tool_config.insert("value".to_string(), json!({ "a": 1, "b": 2 }));

        let out = dispatcher()
            .dispatch(
                &node(
                    "t",
                    NodeData::Tool(ToolData {
                        tool_id: Some("json".to_string()),
                        tool_config: Some(tool_config),
                        ..ToolData::default()
                    }),
                ),
                json!(null),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("tool");
        assert_eq!(out, json!(["a", "b"]));
    }

    #[tokio::test]
    async fn tool_node_without_id_fails() {
        let err = dispatcher()
            .dispatch(
                &node("t", NodeData::Tool(ToolData::default())),
                json!(null),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingToolId { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let err = dispatcher()
            .dispatch(
                &node(
                    "t",
                    NodeData::Tool(ToolData {
                        tool_id: Some("telescope".to_string()),
                        ..ToolData::default()
                    }),
                ),
                json!(null),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnknownTool {
                tool_id: "telescope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn for_each_passes_sequence_through() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "l",
                    NodeData::Loop(LoopData {
                        loop_type: LoopKind::ForEach,
                        ..LoopData::default()
                    }),
                ),
                json!(["x", "y", "z"]),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("loop");
        assert_eq!(out, json!(["x", "y", "z"]));
    }

    #[tokio::test]
    async fn for_each_wraps_scalar_input() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "l",
                    NodeData::Loop(LoopData {
                        loop_type: LoopKind::ForEach,
                        ..LoopData::default()
                    }),
                ),
                json!("solo"),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("loop");
        assert_eq!(out, json!(["solo"]));
    }

    #[tokio::test]
    async fn for_loop_emits_indexed_items() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "l",
                    NodeData::Loop(LoopData {
                        loop_type: LoopKind::For,
                        loop_config: LoopConfig {
                            count: Some(3),
                            ..LoopConfig::default()
                        },
                        ..LoopData::default()
                    }),
                ),
                json!("seed"),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("loop");
        assert_eq!(
            out,
            json!([
                { "index": 0, "input": "seed" },
                { "index": 1, "input": "seed" },
                { "index": 2, "input": "seed" },
            ])
        );
    }

    #[tokio::test]
    async fn while_loop_hits_the_safety_cap() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "l",
                    NodeData::Loop(LoopData {
                        loop_type: LoopKind::While,
                        loop_config: LoopConfig {
                            condition: Some("true".to_string()),
                            ..LoopConfig::default()
                        },
                        ..LoopData::default()
                    }),
                ),
                json!(null),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("loop");
        assert_eq!(out.as_array().map(Vec::len), Some(MAX_LOOP_ITERATIONS as usize));
    }

    #[tokio::test]
    async fn while_loop_false_condition_is_empty() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "l",
                    NodeData::Loop(LoopData {
                        loop_type: LoopKind::While,
                        loop_config: LoopConfig {
                            condition: Some("input > 10".to_string()),
                            ..LoopConfig::default()
                        },
                        ..LoopData::default()
                    }),
                ),
                json!(1),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("loop");
        assert_eq!(out, json!([]));
    }

    #[tokio::test]
    async fn cancelled_loop_aborts_between_iterations() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = dispatcher()
            .dispatch(
                &node(
                    "l",
                    NodeData::Loop(LoopData {
                        loop_type: LoopKind::For,
                        loop_config: LoopConfig {
                            count: Some(10),
                            ..LoopConfig::default()
                        },
                        ..LoopData::default()
                    }),
                ),
                json!(null),
                &context(),
                &cancel,
            )
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Cancelled);
    }

    #[tokio::test]
    async fn merge_flattens_one_level() {
        let dispatcher = dispatcher();
        let out = dispatcher
            .dispatch(
                &node("m", NodeData::Merge(MergeData::default())),
                json!([[1, 2], 3, [4]]),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("merge");
        assert_eq!(out, json!([1, 2, 3, 4]));

        let out = dispatcher
            .dispatch(
                &node("m", NodeData::Merge(MergeData::default())),
                json!({ "not": "a sequence" }),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("merge");
        assert_eq!(out, json!({ "not": "a sequence" }));
    }

    #[tokio::test]
    async fn prompt_renders_template() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "p",
                    NodeData::Prompt(PromptData {
                        prompt_template: Some("Hello {{name}}, got {{input}}".to_string()),
                        variables: vec!["name".to_string()],
                        ..PromptData::default()
                    }),
                ),
                json!({ "name": "Ada" }),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("prompt");
        assert_eq!(out, json!("Hello Ada, got {\"name\":\"Ada\"}"));
    }

    #[tokio::test]
    async fn js_code_receives_input_and_context() {
        let out = dispatcher()
            .dispatch(
                &node(
                    "c",
                    NodeData::Code(CodeData {
                        language: CodeLanguage::Javascript,
                        code: Some("return { id: context.nodeId, doubled: input * 2 };".to_string()),
                        ..CodeData::default()
                    }),
                ),
                json!(21),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .expect("code");
        assert_eq!(out, json!({ "id": "n1", "doubled": 42 }));
    }

    #[tokio::test]
    async fn sensor_without_registered_tool_is_unknown() {
        let err = dispatcher()
            .dispatch(
                &node("s", NodeData::Sensor(Default::default())),
                json!(null),
                &context(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnknownTool {
                tool_id: "sensor".to_string()
            }
        );
    }
}

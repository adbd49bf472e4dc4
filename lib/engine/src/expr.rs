//! Sandboxed evaluation of user expressions and JS-family code.
//!
//! Evaluation runs in a fresh `boa_engine` context per call. The engine
//! has no host bindings, so user code cannot reach the network, the
//! filesystem, or timers; the sole input bindings are the values this
//! module registers. Runaway scripts are bounded twice: loop/recursion
//! limits inside the interpreter, and a wall-clock timeout around the
//! blocking evaluation.
//!
//! Results cross back as JSON by evaluating `JSON.stringify(...)` inside
//! the sandbox and parsing the produced text.

use boa_engine::property::Attribute;
use boa_engine::{Context, JsString, JsValue, Source};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;

/// Wall-clock bound for one evaluation.
const EVAL_TIMEOUT: Duration = Duration::from_secs(5);
/// Interpreter-side bound on loop iterations.
const LOOP_ITERATION_LIMIT: u64 = 1_000_000;
/// Interpreter-side bound on recursion depth.
const RECURSION_LIMIT: usize = 512;

/// Errors from expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// The expression threw, failed to parse, or hit a runtime limit.
    Evaluation { message: String },
    /// The wall-clock timeout elapsed.
    Timeout { after_ms: u64 },
    /// The result could not be converted to a JSON value.
    Conversion { message: String },
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluation { message } => write!(f, "evaluation failed: {message}"),
            Self::Timeout { after_ms } => write!(f, "evaluation timed out after {after_ms}ms"),
            Self::Conversion { message } => write!(f, "result conversion failed: {message}"),
        }
    }
}

impl std::error::Error for ExprError {}

/// Evaluates user expressions in an isolated interpreter.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    timeout: Duration,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self {
            timeout: EVAL_TIMEOUT,
        }
    }
}

impl ExpressionEvaluator {
    /// Creates an evaluator with a custom wall-clock timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Evaluates an expression with `input` bound, returning its value.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] if the expression throws, exceeds a
    /// limit, or produces an unconvertible value.
    pub async fn eval_expression(
        &self,
        expression: &str,
        input: &JsonValue,
    ) -> Result<JsonValue, ExprError> {
        let source = format!("JSON.stringify(( {expression} ))");
        let bindings = vec![("input", input.clone())];
        self.run(source, bindings).await
    }

    /// Evaluates an expression with `input` bound, coercing the result
    /// with JavaScript truthiness.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] if the expression throws or exceeds a
    /// limit.
    pub async fn eval_condition(
        &self,
        expression: &str,
        input: &JsonValue,
    ) -> Result<bool, ExprError> {
        let source = format!("!!( {expression} )");
        let bindings = vec![("input", input.clone())];
        let value = self.run(source, bindings).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Evaluates user source as a function body receiving `input` and
    /// `context`; the function's return value is the result.
    ///
    /// # Errors
    ///
    /// Returns an [`ExprError`] if the code throws, exceeds a limit, or
    /// returns an unconvertible value.
    pub async fn eval_function(
        &self,
        code: &str,
        input: &JsonValue,
        context: &JsonValue,
    ) -> Result<JsonValue, ExprError> {
        let source = format!(
            "JSON.stringify((function (input, context) {{\n{code}\n}})(input, context))"
        );
        let bindings = vec![("input", input.clone()), ("context", context.clone())];
        self.run(source, bindings).await
    }

    async fn run(
        &self,
        source: String,
        bindings: Vec<(&'static str, JsonValue)>,
    ) -> Result<JsonValue, ExprError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let handle = tokio::task::spawn_blocking(move || eval_blocking(&source, &bindings));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExprError::Evaluation {
                message: format!("evaluation task failed: {join_error}"),
            }),
            // The blocking task keeps running until an interpreter limit
            // trips; the node fails now regardless.
            Err(_) => Err(ExprError::Timeout {
                after_ms: timeout_ms,
            }),
        }
    }
}

fn eval_blocking(
    source: &str,
    bindings: &[(&'static str, JsonValue)],
) -> Result<JsonValue, ExprError> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context
        .runtime_limits_mut()
        .set_recursion_limit(RECURSION_LIMIT);

    for (name, value) in bindings {
        let js_value = JsValue::from_json(value, &mut context).map_err(|e| {
            ExprError::Conversion {
                message: format!("failed to bind '{name}': {e}"),
            }
        })?;
        context
            .register_global_property(JsString::from(*name), js_value, Attribute::all())
            .map_err(|e| ExprError::Evaluation {
                message: format!("failed to register '{name}': {e}"),
            })?;
    }

    let value = context
        .eval(Source::from_bytes(source.as_bytes()))
        .map_err(|e| ExprError::Evaluation {
            message: e.to_string(),
        })?;

    // `JSON.stringify(undefined)` evaluates to undefined.
    if value.is_undefined() || value.is_null() {
        return Ok(JsonValue::Null);
    }
    if let Some(b) = value.as_boolean() {
        return Ok(JsonValue::Bool(b));
    }

    let text = value
        .to_string(&mut context)
        .map_err(|e| ExprError::Conversion {
            message: e.to_string(),
        })?
        .to_std_string_escaped();

    serde_json::from_str(&text).map_err(|e| ExprError::Conversion {
        message: format!("stringified result is not valid JSON: {e}"),
    })
}

//! The flowstone execution engine.
//!
//! This crate owns the non-trivial runtime:
//! - Sandboxed expression evaluation for `condition`, `transform`, and
//!   JS-family `code` nodes
//! - The node dispatcher: per-kind input-to-output semantics
//! - The DAG runner: topological parallel scheduling with in-degree
//!   tracking, fan-in, fail-fast, and cooperative cancellation
//! - The engine: the process-wide orchestrator bridging runner events to
//!   persistence and to subscribed sinks

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod expr;
pub mod runner;
pub mod template;

pub use dispatch::NodeDispatcher;
pub use engine::{BroadcastSink, Engine, EventSink, NullSink};
pub use error::{DispatchError, EngineError};
pub use expr::{ExprError, ExpressionEvaluator};
pub use runner::{DagRunner, RunOutcome};

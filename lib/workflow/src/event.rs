//! The streaming execution event log.
//!
//! A runner emits, in causal order per node: `node:start`, then either
//! `node:complete` or `node:error`. On terminal it emits
//! `execution:complete` or `execution:error`. `log` lines interleave
//! freely. Delivery to subscribers is at-least-once; subscribers must be
//! idempotent on (node id, event name).

use crate::execution::{LogLevel, LogLine};
use crate::node::NodeKind;
use chrono::{DateTime, Utc};
use flowstone_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// An event on the execution stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum ExecutionEvent {
    /// A node was dispatched.
    #[serde(rename = "node:start")]
    NodeStart { node_id: NodeId, kind: NodeKind },
    /// A node completed; its output is now in the output table.
    #[serde(rename = "node:complete")]
    NodeComplete { node_id: NodeId, output: JsonValue },
    /// A node failed; the execution will abort.
    #[serde(rename = "node:error")]
    NodeError { node_id: NodeId, error: String },
    /// The execution reached `completed`.
    #[serde(rename = "execution:complete")]
    ExecutionComplete { output: JsonValue },
    /// The execution reached `error`.
    #[serde(rename = "execution:error")]
    ExecutionError { error: String },
    /// A log line.
    #[serde(rename = "log")]
    Log {
        level: LogLevel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node_id: Option<NodeId>,
        message: String,
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<JsonValue>,
    },
}

impl ExecutionEvent {
    /// Returns the wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NodeStart { .. } => "node:start",
            Self::NodeComplete { .. } => "node:complete",
            Self::NodeError { .. } => "node:error",
            Self::ExecutionComplete { .. } => "execution:complete",
            Self::ExecutionError { .. } => "execution:error",
            Self::Log { .. } => "log",
        }
    }

    /// Returns the node this event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeStart { node_id, .. }
            | Self::NodeComplete { node_id, .. }
            | Self::NodeError { node_id, .. } => Some(node_id),
            Self::Log { node_id, .. } => node_id.as_ref(),
            Self::ExecutionComplete { .. } | Self::ExecutionError { .. } => None,
        }
    }

    /// Builds a `log` event from a log line.
    #[must_use]
    pub fn from_log_line(line: LogLine) -> Self {
        Self::Log {
            level: line.level,
            node_id: line.node_id,
            message: line.message,
            timestamp: line.timestamp,
            data: line.data,
        }
    }
}

/// Sender half of a runner's event stream.
///
/// Emission never blocks and never fails: if the receiving side is gone
/// the event is dropped, which only happens when the owning execution is
/// being torn down.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<ExecutionEvent>,
}

impl EventEmitter {
    /// Creates an emitter and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emits an event.
    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    /// Emits a `log` event stamped now.
    pub fn log(&self, level: LogLevel, node_id: Option<NodeId>, message: impl Into<String>) {
        self.emit(ExecutionEvent::Log {
            level,
            node_id,
            message: message.into(),
            timestamp: Utc::now(),
            data: None,
        });
    }

    /// Emits a `log` event with a structured payload.
    pub fn log_data(
        &self,
        level: LogLevel,
        node_id: Option<NodeId>,
        message: impl Into<String>,
        data: JsonValue,
    ) {
        self.emit(ExecutionEvent::Log {
            level,
            node_id,
            message: message.into(),
            timestamp: Utc::now(),
            data: Some(data),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_names() {
        let event = ExecutionEvent::NodeStart {
            node_id: "a".into(),
            kind: NodeKind::Input,
        };
        assert_eq!(event.name(), "node:start");

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["event"], "node:start");
        assert_eq!(value["nodeId"], "a");
        assert_eq!(value["kind"], "input");
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = ExecutionEvent::NodeComplete {
            node_id: "b".into(),
            output: serde_json::json!({ "left": 5 }),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: ExecutionEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, parsed);
    }

    #[test]
    fn emitter_delivers_in_order() {
        let (emitter, mut rx) = EventEmitter::channel();
        emitter.log(LogLevel::Info, None, "first");
        emitter.log(LogLevel::Info, None, "second");

        let first = rx.try_recv().expect("first event");
        let second = rx.try_recv().expect("second event");
        match (first, second) {
            (
                ExecutionEvent::Log { message: m1, .. },
                ExecutionEvent::Log { message: m2, .. },
            ) => {
                assert_eq!(m1, "first");
                assert_eq!(m2, "second");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn emit_after_receiver_drop_is_silent() {
        let (emitter, rx) = EventEmitter::channel();
        drop(rx);
        emitter.log(LogLevel::Debug, None, "into the void");
    }
}

//! Strongly-typed ID types for domain entities.
//!
//! Two families of identifier exist in flowstone:
//! - Generated IDs (`ExecutionId`, `TemplateId`) use ULID format,
//!   providing both uniqueness and temporal ordering.
//! - Document IDs (`WorkflowId`, `NodeId`, `EdgeId`) are opaque strings
//!   chosen by whoever authored the workflow document (editor, generator,
//!   or a hand-written file). The runtime never interprets them beyond
//!   equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing a generated ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a strongly-typed ID wrapper around ULID.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Ulid);

        impl $name {
            /// Creates a new ID with a randomly generated ULID.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Creates an ID from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }

            /// Returns the prefix used for display formatting.
            #[must_use]
            pub const fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // Accept both the prefixed display form and a raw ULID.
                let prefix_with_underscore = concat!($prefix, "_");
                let ulid_str = s.strip_prefix(prefix_with_underscore).unwrap_or(s);

                Ulid::from_str(ulid_str)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        reason: e.to_string(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Macro to generate an opaque string ID for document-supplied identifiers.
macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an ID from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a single execution of a workflow.
    ExecutionId,
    "exec"
);

define_id!(
    /// Unique identifier for a stored workflow template.
    TemplateId,
    "tpl"
);

define_string_id!(
    /// Opaque identifier for a workflow, chosen by the document author.
    WorkflowId
);

define_string_id!(
    /// Opaque identifier for a node, unique within its workflow.
    NodeId
);

define_string_id!(
    /// Opaque identifier for an edge, unique within its workflow.
    EdgeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_id_display_format() {
        let id = ExecutionId::new();
        let display = id.to_string();
        assert!(display.starts_with("exec_"));
    }

    #[test]
    fn execution_id_parse_with_prefix() {
        let id = ExecutionId::new();
        let display = id.to_string();
        let parsed: ExecutionId = display.parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn execution_id_parse_without_prefix() {
        let ulid = Ulid::new();
        let id: ExecutionId = ulid.to_string().parse().expect("should parse");
        assert_eq!(id.as_ulid(), ulid);
    }

    #[test]
    fn execution_id_parse_invalid() {
        let result: Result<ExecutionId, _> = "not_a_ulid".parse();
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.id_type, "ExecutionId");
    }

    #[test]
    fn execution_id_serde_roundtrip() {
        let id = ExecutionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        let parsed: ExecutionId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_id_is_transparent_in_json() {
        let id = NodeId::from("step-1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"step-1\"");
    }

    #[test]
    fn node_id_equality_with_str() {
        let id = NodeId::from("a");
        assert_eq!(id, "a");
        assert_ne!(id, "b");
    }

    #[test]
    fn node_id_usable_as_map_key_by_str() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(NodeId::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn workflow_id_display_is_verbatim() {
        let id = WorkflowId::from("daily-digest");
        assert_eq!(id.to_string(), "daily-digest");
    }
}

//! Error types for the store crate.

use std::fmt;

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The storage backend faulted. The underlying cause is preserved
    /// in the message.
    Storage { message: String },
    /// A persisted record could not be decoded.
    CorruptRecord {
        entity: &'static str,
        id: String,
        reason: String,
    },
    /// The named record does not exist.
    NotFound { entity: &'static str, id: String },
}

impl StoreError {
    /// Wraps a JSON decoding failure as a corrupt record.
    #[must_use]
    pub fn corrupt(entity: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            entity,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Builds a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { message } => write!(f, "storage error: {message}"),
            Self::CorruptRecord { entity, id, reason } => {
                write!(f, "corrupt {entity} record '{id}': {reason}")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage {
            message: e.to_string(),
        }
    }
}

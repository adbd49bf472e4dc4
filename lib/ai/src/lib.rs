//! Uniform chat gateway over model providers.
//!
//! One `chat` operation over the supported providers, selected at call
//! time. Provider credentials are read from a snapshot of the live
//! configuration; [`gateway::ModelGateway::refresh`] swaps the snapshot
//! so key rotation does not require a process restart.

pub mod backend;
pub mod error;
pub mod gateway;
mod providers;

pub use backend::{ChatBackend, ChatRequest};
pub use error::AiError;
pub use gateway::ModelGateway;

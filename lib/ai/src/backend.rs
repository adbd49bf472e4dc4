//! Chat backend abstraction.
//!
//! Every provider implements [`ChatBackend`]; the gateway routes a
//! [`ChatRequest`] to the backend matching its provider selector and
//! hands over the credential from the live snapshot.

use crate::error::AiError;
use async_trait::async_trait;
use flowstone_core::Provider;
use serde::{Deserialize, Serialize};

/// A chat request: one system/user prompt pair plus sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The provider to route through.
    pub provider: Provider,
    /// Model identifier understood by the provider.
    pub model: String,
    /// System prompt, if any.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Creates a request with just a provider, model, and prompt.
    #[must_use]
    pub fn new(provider: Provider, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Trait for chat backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// The provider this backend speaks for.
    fn provider(&self) -> Provider;

    /// Sends the request and returns the completion text.
    ///
    /// `api_key` is the credential from the gateway's live snapshot;
    /// backends that require one fail `ProviderUnconfigured` when it is
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns an [`AiError`] classified as unconfigured, timeout, or
    /// provider error.
    async fn chat(&self, request: &ChatRequest, api_key: Option<&str>) -> Result<String, AiError>;
}

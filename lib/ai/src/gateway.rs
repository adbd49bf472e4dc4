//! The model gateway.
//!
//! Routes chat requests to the backend matching the provider selector
//! and owns the credential snapshot. Credentials are swapped atomically
//! on refresh so key rotation never requires a restart; in-flight calls
//! keep the snapshot they started with.

use crate::backend::{ChatBackend, ChatRequest};
use crate::error::AiError;
use crate::providers::{AnthropicBackend, OllamaBackend, OpenAiDialectBackend};
use flowstone_core::{AppConfig, Provider};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Wall-clock deadline for a single provider round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

type CredentialSnapshot = HashMap<Provider, String>;

/// Uniform chat contract over the supported providers.
pub struct ModelGateway {
    backends: HashMap<Provider, Box<dyn ChatBackend>>,
    credentials: RwLock<Arc<CredentialSnapshot>>,
}

impl ModelGateway {
    /// Builds a gateway with all four backends from the configuration.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        let mut backends: HashMap<Provider, Box<dyn ChatBackend>> = HashMap::new();
        backends.insert(
            Provider::OpenAi,
            Box::new(OpenAiDialectBackend::openai(client.clone())),
        );
        backends.insert(
            Provider::Groq,
            Box::new(OpenAiDialectBackend::groq(client.clone())),
        );
        backends.insert(
            Provider::Anthropic,
            Box::new(AnthropicBackend::new(client.clone())),
        );
        backends.insert(
            Provider::Ollama,
            Box::new(OllamaBackend::new(client, config.ollama_host.clone())),
        );

        Self {
            backends,
            credentials: RwLock::new(Arc::new(snapshot_from(config))),
        }
    }

    /// Re-reads credentials from the given configuration, atomically
    /// replacing the live snapshot.
    pub fn refresh(&self, config: &AppConfig) {
        let snapshot = Arc::new(snapshot_from(config));
        if let Ok(mut guard) = self.credentials.write() {
            *guard = snapshot;
        }
    }

    /// Sends a chat request through the selected provider.
    ///
    /// # Errors
    ///
    /// `ProviderUnconfigured` when a required credential is missing,
    /// `ProviderTimeout` when the deadline elapses, `ProviderError` for
    /// backend faults.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, AiError> {
        let backend = self
            .backends
            .get(&request.provider)
            .ok_or(AiError::ProviderUnconfigured {
                provider: request.provider,
            })?;

        let snapshot = self
            .credentials
            .read()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_default();
        let api_key = snapshot.get(&request.provider).map(String::as_str);

        tracing::debug!(
            provider = %request.provider,
            model = %request.model,
            "dispatching chat request"
        );
        backend.chat(request, api_key).await
    }

    /// Registers or replaces a backend. Exists for tests and for
    /// embedding alternative providers.
    pub fn set_backend(&mut self, backend: Box<dyn ChatBackend>) {
        self.backends.insert(backend.provider(), backend);
    }
}

fn snapshot_from(config: &AppConfig) -> CredentialSnapshot {
    Provider::ALL
        .into_iter()
        .filter_map(|p| config.api_key(p).map(|k| (p, k.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowstone_core::ProviderCredential;
    use std::sync::Mutex;

    /// Backend fake recording the key it was handed.
    struct RecordingBackend {
        provider: Provider,
        seen_keys: Arc<Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl ChatBackend for RecordingBackend {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn chat(
            &self,
            _request: &ChatRequest,
            api_key: Option<&str>,
        ) -> Result<String, AiError> {
            self.seen_keys
                .lock()
                .unwrap()
                .push(api_key.map(str::to_string));
            Ok("stub completion".to_string())
        }
    }

    fn config_with_key(provider: Provider, key: &str) -> AppConfig {
        let mut config = AppConfig::default();
        config
            .providers
            .insert(provider, ProviderCredential::from_key(key));
        config
    }

    #[tokio::test]
    async fn chat_routes_to_matching_backend_with_credential() {
        let config = config_with_key(Provider::OpenAi, "sk-original");
        let mut gateway = ModelGateway::new(&config);

        let seen_keys = Arc::new(Mutex::new(Vec::new()));
        gateway.set_backend(Box::new(RecordingBackend {
            provider: Provider::OpenAi,
            seen_keys: Arc::clone(&seen_keys),
        }));

        let request = ChatRequest::new(Provider::OpenAi, "gpt-4o-mini", "Hi");
        let completion = gateway.chat(&request).await.expect("chat");
        assert_eq!(completion, "stub completion");
        assert_eq!(
            seen_keys.lock().unwrap().as_slice(),
            &[Some("sk-original".to_string())]
        );
    }

    #[tokio::test]
    async fn refresh_swaps_credentials_without_rebuild() {
        let config = config_with_key(Provider::Anthropic, "sk-old");
        let mut gateway = ModelGateway::new(&config);

        let seen_keys = Arc::new(Mutex::new(Vec::new()));
        gateway.set_backend(Box::new(RecordingBackend {
            provider: Provider::Anthropic,
            seen_keys: Arc::clone(&seen_keys),
        }));

        let request = ChatRequest::new(Provider::Anthropic, "claude-sonnet-4-5", "Hi");
        gateway.chat(&request).await.expect("first call");

        gateway.refresh(&config_with_key(Provider::Anthropic, "sk-rotated"));
        gateway.chat(&request).await.expect("second call");

        assert_eq!(
            seen_keys.lock().unwrap().as_slice(),
            &[
                Some("sk-old".to_string()),
                Some("sk-rotated".to_string())
            ]
        );
    }
}

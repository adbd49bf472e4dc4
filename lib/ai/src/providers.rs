//! Provider backends over HTTP.
//!
//! Three wire dialects cover the four providers: the OpenAI chat
//! completions dialect (OpenAI and Groq), the Anthropic messages API,
//! and the Ollama chat API. Request bodies and response extraction are
//! pure functions so they can be tested without a network.

use crate::backend::{ChatBackend, ChatRequest};
use crate::error::AiError;
use async_trait::async_trait;
use flowstone_core::Provider;
use serde_json::{Value as JsonValue, json};

const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Anthropic requires max_tokens; applied when the node omits it.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Backend for the OpenAI chat completions dialect (OpenAI, Groq).
pub struct OpenAiDialectBackend {
    provider: Provider,
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiDialectBackend {
    pub fn openai(client: reqwest::Client) -> Self {
        Self {
            provider: Provider::OpenAi,
            client,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }

    pub fn groq(client: reqwest::Client) -> Self {
        Self {
            provider: Provider::Groq,
            client,
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
        }
    }
}

pub(crate) fn openai_body(request: &ChatRequest) -> JsonValue {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

pub(crate) fn extract_openai_content(
    provider: Provider,
    value: &JsonValue,
) -> Result<String, AiError> {
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AiError::ProviderError {
            provider,
            reason: "response missing choices[0].message.content".to_string(),
        })
}

#[async_trait]
impl ChatBackend for OpenAiDialectBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn chat(&self, request: &ChatRequest, api_key: Option<&str>) -> Result<String, AiError> {
        let api_key = api_key.ok_or(AiError::ProviderUnconfigured {
            provider: self.provider,
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&openai_body(request))
            .send()
            .await
            .map_err(|e| AiError::from_transport(self.provider, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::ProviderError {
                provider: self.provider,
                reason: format!("status {status}: {}", truncate(&body, 300)),
            });
        }

        let value: JsonValue = response
            .json()
            .await
            .map_err(|e| AiError::from_transport(self.provider, &e))?;
        extract_openai_content(self.provider, &value)
    }
}

/// Backend for the Anthropic messages API.
pub struct AnthropicBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
        }
    }
}

pub(crate) fn anthropic_body(request: &ChatRequest) -> JsonValue {
    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": [ { "role": "user", "content": request.prompt } ],
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

pub(crate) fn extract_anthropic_content(value: &JsonValue) -> Result<String, AiError> {
    value["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AiError::ProviderError {
            provider: Provider::Anthropic,
            reason: "response missing content[0].text".to_string(),
        })
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn chat(&self, request: &ChatRequest, api_key: Option<&str>) -> Result<String, AiError> {
        let api_key = api_key.ok_or(AiError::ProviderUnconfigured {
            provider: Provider::Anthropic,
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&anthropic_body(request))
            .send()
            .await
            .map_err(|e| AiError::from_transport(Provider::Anthropic, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::ProviderError {
                provider: Provider::Anthropic,
                reason: format!("status {status}: {}", truncate(&body, 300)),
            });
        }

        let value: JsonValue = response
            .json()
            .await
            .map_err(|e| AiError::from_transport(Provider::Anthropic, &e))?;
        extract_anthropic_content(&value)
    }
}

/// Backend for a local Ollama instance. Needs no credential.
pub struct OllamaBackend {
    client: reqwest::Client,
    host: String,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
        }
    }
}

pub(crate) fn ollama_body(request: &ChatRequest) -> JsonValue {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    let mut options = json!({});
    if let Some(temperature) = request.temperature {
        options["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        options["num_predict"] = json!(max_tokens);
    }

    json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
        "options": options,
    })
}

pub(crate) fn extract_ollama_content(value: &JsonValue) -> Result<String, AiError> {
    value["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AiError::ProviderError {
            provider: Provider::Ollama,
            reason: "response missing message.content".to_string(),
        })
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn chat(&self, request: &ChatRequest, _api_key: Option<&str>) -> Result<String, AiError> {
        let url = format!("{}/api/chat", self.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&ollama_body(request))
            .send()
            .await
            .map_err(|e| AiError::from_transport(Provider::Ollama, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::ProviderError {
                provider: Provider::Ollama,
                reason: format!("status {status}: {}", truncate(&body, 300)),
            });
        }

        let value: JsonValue = response
            .json()
            .await
            .map_err(|e| AiError::from_transport(Provider::Ollama, &e))?;
        extract_ollama_content(&value)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

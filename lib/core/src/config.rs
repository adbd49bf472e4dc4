//! Process configuration.
//!
//! Configuration is a single JSON document loaded via the `config` crate,
//! with provider API keys optionally supplied through `{PROVIDER}_API_KEY`
//! environment variables. Explicit file configuration takes precedence
//! over the environment.
//!
//! The loaded [`AppConfig`] is snapshotted into each execution at start;
//! runners never observe configuration changes mid-flight.

use crate::provider::Provider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Credential material for one provider.
///
/// The lowercase aliases exist because the `config` crate normalizes
/// file keys to lowercase before deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    /// API key for the provider, if any. Ollama runs without one.
    #[serde(
        rename = "apiKey",
        alias = "apikey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<String>,
}

impl ProviderCredential {
    /// Creates a credential from a bare API key.
    #[must_use]
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }
}

/// The process configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider credential material keyed by provider name.
    #[serde(default)]
    pub providers: HashMap<Provider, ProviderCredential>,

    /// Provider used when a node does not name one.
    #[serde(
        rename = "defaultProvider",
        alias = "defaultprovider",
        default = "default_provider"
    )]
    pub default_provider: Provider,

    /// Model used when a node does not name one.
    #[serde(
        rename = "defaultModel",
        alias = "defaultmodel",
        default = "default_model"
    )]
    pub default_model: String,

    /// Base URL of the local Ollama instance.
    #[serde(
        rename = "ollamaHost",
        alias = "ollamahost",
        default = "default_ollama_host"
    )]
    pub ollama_host: String,

    /// Upper bound on simultaneously running executions.
    #[serde(
        rename = "maxConcurrentExecutions",
        alias = "maxconcurrentexecutions",
        default = "default_max_concurrent_executions"
    )]
    pub max_concurrent_executions: usize,

    /// Reserved for a node-level retry policy; not consumed by the runner.
    #[serde(
        rename = "maxRetries",
        alias = "maxretries",
        default = "default_max_retries"
    )]
    pub max_retries: u32,

    /// Delay between retries in milliseconds. Reserved, as `max_retries`.
    #[serde(
        rename = "retryDelay",
        alias = "retrydelay",
        default = "default_retry_delay"
    )]
    pub retry_delay: u64,

    /// Log level filter for the process (`debug`/`info`/`warn`/`error`).
    #[serde(
        rename = "logLevel",
        alias = "loglevel",
        default = "default_log_level"
    )]
    pub log_level: String,

    /// Root directory for the `file` tool. Paths escaping it are denied.
    #[serde(
        rename = "workspaceDir",
        alias = "workspacedir",
        default = "default_workspace_dir"
    )]
    pub workspace_dir: String,
}

fn default_provider() -> Provider {
    Provider::OpenAi
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_max_concurrent_executions() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workspace_dir() -> String {
    "./workspace".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            ollama_host: default_ollama_host(),
            max_concurrent_executions: default_max_concurrent_executions(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            log_level: default_log_level(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file, then overlays credentials
    /// from `{PROVIDER}_API_KEY` environment variables for providers the
    /// file did not configure.
    ///
    /// A missing file yields the defaults plus the environment overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed into a
    /// valid configuration document.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .build()
            .map_err(|e| ConfigError::Invalid {
                reason: e.to_string(),
            })?;

        let mut app: AppConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigError::Invalid {
                    reason: e.to_string(),
                })?;

        app.overlay_env();
        Ok(app)
    }

    /// Fills credentials from the environment for providers without an
    /// explicit key. Explicit configuration always wins.
    pub fn overlay_env(&mut self) {
        for provider in Provider::ALL {
            let has_key = self
                .providers
                .get(&provider)
                .is_some_and(|c| c.api_key.is_some());
            if has_key {
                continue;
            }
            if let Ok(key) = std::env::var(provider.api_key_env_var())
                && !key.is_empty()
            {
                self.providers
                    .insert(provider, ProviderCredential::from_key(key));
            }
        }
    }

    /// Returns the API key configured for a provider, if any.
    #[must_use]
    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.providers
            .get(&provider)
            .and_then(|c| c.api_key.as_deref())
    }
}

/// Errors from configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration document could not be read or parsed.
    Invalid { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, Provider::OpenAi);
        assert_eq!(config.max_concurrent_executions, 10);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist.json");
        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.default_model, default_model());
    }

    #[test]
    fn load_reads_camel_case_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).expect("create");
        write!(
            file,
            r#"{{
                "defaultProvider": "anthropic",
                "defaultModel": "claude-sonnet-4-5",
                "maxConcurrentExecutions": 2,
                "providers": {{ "anthropic": {{ "apiKey": "sk-test" }} }}
            }}"#
        )
        .expect("write");

        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.default_provider, Provider::Anthropic);
        assert_eq!(config.default_model, "claude-sonnet-4-5");
        assert_eq!(config.max_concurrent_executions, 2);
        assert_eq!(config.api_key(Provider::Anthropic), Some("sk-test"));
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert(Provider::OpenAi, ProviderCredential::from_key("explicit"));

        // SAFETY: test-local mutation; no other thread reads this variable.
        unsafe { std::env::set_var("OPENAI_API_KEY", "from-env") };
        config.overlay_env();
        unsafe { std::env::remove_var("OPENAI_API_KEY") };

        assert_eq!(config.api_key(Provider::OpenAi), Some("explicit"));
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: AppConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, parsed);
    }
}

//! The closed set of model providers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A model provider supported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions API.
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Groq (OpenAI-compatible dialect).
    Groq,
    /// Local Ollama instance.
    Ollama,
}

impl Provider {
    /// All providers, in a stable order.
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Groq,
        Provider::Ollama,
    ];

    /// Returns the lowercase wire name of this provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
            Self::Ollama => "ollama",
        }
    }

    /// Returns the environment variable that may carry this provider's key.
    #[must_use]
    pub fn api_key_env_var(&self) -> String {
        format!("{}_API_KEY", self.as_str().to_uppercase())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "groq" => Ok(Self::Groq),
            "ollama" => Ok(Self::Ollama),
            other => Err(UnknownProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// Error returned when a provider name is not in the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider {
    /// The rejected provider name.
    pub name: String,
}

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown provider: {}", self.name)
    }
}

impl std::error::Error for UnknownProvider {}

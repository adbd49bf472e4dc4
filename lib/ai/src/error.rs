//! Error types for the AI crate.

use flowstone_core::Provider;
use std::fmt;

/// Errors from model gateway operations, classified per the runtime's
/// error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// No credential is configured for the provider.
    ProviderUnconfigured { provider: Provider },
    /// The backend faulted: transport failure, non-2xx status, or an
    /// undecodable response.
    ProviderError { provider: Provider, reason: String },
    /// The request deadline elapsed.
    ProviderTimeout { provider: Provider },
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnconfigured { provider } => {
                write!(f, "provider '{provider}' is not configured (missing API key)")
            }
            Self::ProviderError { provider, reason } => {
                write!(f, "provider '{provider}' error: {reason}")
            }
            Self::ProviderTimeout { provider } => {
                write!(f, "provider '{provider}' timed out")
            }
        }
    }
}

impl std::error::Error for AiError {}

impl AiError {
    /// Classifies a transport error from the HTTP client.
    #[must_use]
    pub fn from_transport(provider: Provider, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::ProviderTimeout { provider }
        } else {
            Self::ProviderError {
                provider,
                reason: error.to_string(),
            }
        }
    }
}

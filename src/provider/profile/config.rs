use crate::config::{LlmCredentials, LlmSettings};
use crate::error::ApiError;
use crate::provider::CompletionOptions;
use serde::{Deserialize, Serialize};

fn default_request_timeout_secs() -> u64 {
    120
}

/// Model provider configuration for one run.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier, possibly carrying a routing prefix such as `openrouter/`.
    pub model: String,

    /// Base URL of the chat-completions API.
    pub endpoint: String,

    /// Bearer token.
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Default completion options for every request.
    #[serde(default)]
    pub default_options: CompletionOptions,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("default_options", &self.default_options)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    /// Combine environment credentials with the configured defaults.
    pub fn from_credentials(credentials: &LlmCredentials, settings: &LlmSettings) -> Self {
        Self {
            model: credentials.model.clone(),
            endpoint: credentials.base_url.trim().to_string(),
            api_key: credentials.api_key.clone(),
            default_options: settings.default_options.clone(),
            request_timeout_secs: settings.request_timeout_secs,
        }
    }

    /// Model name as sent on the wire.
    ///
    /// OpenRouter-style identifiers carry an `openrouter/` routing prefix that
    /// the API itself does not accept.
    pub fn wire_model(&self) -> &str {
        self.model
            .strip_prefix("openrouter/")
            .unwrap_or(&self.model)
    }

    pub fn endpoint_url_is_valid(endpoint: &str) -> bool {
        let endpoint = endpoint.trim();
        let Some((scheme, rest)) = endpoint.split_once("://") else {
            return false;
        };
        if scheme != "http" && scheme != "https" {
            return false;
        }

        if rest.is_empty() || rest.chars().any(char::is_whitespace) {
            return false;
        }

        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return false;
        }

        let host_port = authority.rsplit('@').next().unwrap_or(authority);
        let host = if host_port.starts_with('[') {
            let Some(end_bracket) = host_port.find(']') else {
                return false;
            };
            &host_port[1..end_bracket]
        } else {
            host_port.split(':').next().unwrap_or_default()
        };

        if host.is_empty() {
            return false;
        }

        host == "localhost" || host.contains('.') || host.parse::<std::net::IpAddr>().is_ok()
    }

    /// Validate provider configuration.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.model.trim().is_empty() {
            return Err(ApiError::ProviderNotConfigured(
                "Model name cannot be empty".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(ApiError::ProviderNotConfigured(
                "API key cannot be empty".to_string(),
            ));
        }
        if !Self::endpoint_url_is_valid(&self.endpoint) {
            return Err(ApiError::ProviderNotConfigured(format!(
                "Invalid endpoint URL: {}",
                self.endpoint
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ApiError::ProviderNotConfigured(
                "Request timeout must be positive".to_string(),
            ));
        }
        self.default_options
            .validate()
            .map_err(ApiError::ProviderNotConfigured)
    }
}

//! LLM credentials read from the process environment.

use crate::config::LlmSettings;
use crate::error::ApiError;
use std::fmt;

/// Model name, base URL and API key for the language model.
#[derive(Clone, PartialEq, Eq)]
pub struct LlmCredentials {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl fmt::Debug for LlmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmCredentials")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl LlmCredentials {
    /// Read the variables named by `settings`.
    ///
    /// Fails on the first variable that is unset or blank.
    pub fn from_env(settings: &LlmSettings) -> Result<Self, ApiError> {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Same as [`LlmCredentials::from_env`] with an explicit lookup.
    pub fn from_lookup<F>(settings: &LlmSettings, lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String, ApiError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::MissingCredential(key.to_string()))
        };
        Ok(Self {
            model: require(&settings.model_env)?,
            base_url: require(&settings.base_url_env)?,
            api_key: require(&settings.api_key_env)?,
        })
    }
}

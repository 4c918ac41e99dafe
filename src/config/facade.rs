//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::AppConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the standard files and the environment.
    pub fn load(workspace_root: &Path) -> Result<AppConfig, ApiError> {
        let config = MergeService::load(workspace_root)?;
        Self::checked(config)
    }

    /// Load configuration from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<AppConfig, ApiError> {
        if !path.is_file() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = MergeService::load_from_file(path)?;
        Self::checked(config)
    }

    /// Create default configuration.
    pub fn default() -> AppConfig {
        AppConfig::default()
    }

    fn checked(config: AppConfig) -> Result<AppConfig, ApiError> {
        config.validate().map_err(ApiError::ConfigError)?;
        Ok(config)
    }
}

//! Provider profile: resolved model endpoint settings.

pub mod config;

pub use config::ProviderConfig;

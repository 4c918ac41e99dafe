pub mod config;
pub mod validation;

pub use config::{AgentConfig, TextSource};
pub use validation::validate_agent_config;

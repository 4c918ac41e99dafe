//! Agents: personas that answer tasks with a model and tools.

pub mod definition;
pub mod domain;
pub mod executor;
pub mod prompt;
pub mod template;

pub use definition::Agent;
pub use domain::{validate_agent_config, AgentConfig, TextSource};
pub use executor::AgentExecutor;
pub use prompt::{resolve_prompt_path, PromptCache};

/// Tool-call rounds an agent gets before a final answer is forced.
pub const DEFAULT_MAX_ITERATIONS: usize = 20;

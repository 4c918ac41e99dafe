//! Agent configuration validation owned by the agent domain.

use super::config::AgentConfig;
use std::collections::HashSet;

/// Validate an agent declaration against the crew's tool providers.
pub fn validate_agent_config(
    agent: &AgentConfig,
    providers: &HashSet<&str>,
) -> Result<(), String> {
    if agent.name.trim().is_empty() {
        return Err("Agent name cannot be empty".to_string());
    }

    for (field, source) in [
        ("role", &agent.role),
        ("goal", &agent.goal),
        ("backstory", &agent.backstory),
    ] {
        if source.is_blank() {
            return Err(format!("Agent '{}': {} cannot be empty", agent.name, field));
        }
    }

    if agent.max_iterations == 0 {
        return Err(format!(
            "Agent '{}': max_iterations must be positive",
            agent.name
        ));
    }

    let mut seen = HashSet::new();
    for tool in &agent.tools {
        if !providers.contains(tool.as_str()) {
            return Err(format!(
                "Agent '{}' references unknown tool provider '{}'",
                agent.name, tool
            ));
        }
        if !seen.insert(tool.as_str()) {
            return Err(format!(
                "Agent '{}' lists tool provider '{}' twice",
                agent.name, tool
            ));
        }
    }

    Ok(())
}

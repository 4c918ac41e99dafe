//! Scoped start and stop of a crew's tool providers.

use crate::agent::Agent;
use crate::error::ApiError;
use crate::tools::{Tool, ToolProvider, ToolSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Tool providers started for one run.
///
/// Providers are started in declared order and stopped in reverse order.
/// [`ToolSession::stop_all`] consumes the session, so each provider is
/// stopped at most once.
pub struct ToolSession<'p> {
    providers: &'p mut [Box<dyn ToolProvider>],
    started: usize,
    tools: HashMap<String, Vec<Arc<dyn Tool>>>,
}

impl<'p> ToolSession<'p> {
    /// A session with nothing started yet.
    pub fn new(providers: &'p mut [Box<dyn ToolProvider>]) -> Self {
        Self {
            providers,
            started: 0,
            tools: HashMap::new(),
        }
    }

    /// Start every provider in declared order.
    ///
    /// Stops at the first failure. Whatever started before it, or before the
    /// future was cancelled, is still owned by the session and is released by
    /// [`ToolSession::stop_all`].
    pub async fn start_all(&mut self) -> Result<(), ApiError> {
        while self.started < self.providers.len() {
            let provider = &mut self.providers[self.started];
            let name = provider.name().to_string();
            let started = Instant::now();
            match provider.start().await {
                Ok(tools) => {
                    info!(
                        provider = %name,
                        tools = tools.len(),
                        duration_ms = started.elapsed().as_millis(),
                        "Tool provider started"
                    );
                    self.tools.insert(name, tools);
                    self.started += 1;
                }
                Err(e) => {
                    error!(provider = %name, error = %e, "Tool provider failed to start");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Tools from every provider the agent references.
    pub fn tools_for(&self, agent: &Agent) -> Result<ToolSet, ApiError> {
        let mut set = ToolSet::new();
        for provider in agent.tools() {
            let tools = self.tools.get(provider).ok_or_else(|| {
                ApiError::ConfigError(format!(
                    "Agent '{}' references tool provider '{}' which is not running",
                    agent.name(),
                    provider
                ))
            })?;
            for tool in tools {
                set.insert(Arc::clone(tool))?;
            }
        }
        Ok(set)
    }

    /// Names of the providers currently running, in start order.
    pub fn running(&self) -> Vec<&str> {
        self.providers[..self.started]
            .iter()
            .map(|p| p.name())
            .collect()
    }

    /// Stop every started provider in reverse order.
    ///
    /// All providers are attempted even when one fails; the first failure is
    /// returned.
    pub async fn stop_all(mut self) -> Result<(), ApiError> {
        let mut first_error = None;
        while self.started > 0 {
            self.started -= 1;
            let provider = &mut self.providers[self.started];
            let name = provider.name().to_string();
            self.tools.remove(&name);
            match provider.stop().await {
                Ok(()) => info!(provider = %name, "Tool provider stopped"),
                Err(e) => {
                    error!(provider = %name, error = %e, "Tool provider failed to stop");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ToolSession<'_> {
    fn drop(&mut self) {
        if self.started == 0 {
            return;
        }
        warn!(
            running = ?self.running(),
            "Tool session dropped without stop, killing providers"
        );
        self.tools.clear();
        while self.started > 0 {
            self.started -= 1;
            self.providers[self.started].abort();
        }
    }
}

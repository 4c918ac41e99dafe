//! Tool provider backed by one MCP server process.

use crate::config::McpSettings;
use crate::error::ApiError;
use crate::tools::mcp::client::{ClientTimeouts, McpClient};
use crate::tools::mcp::protocol::McpToolDefinition;
use crate::tools::mcp::McpServerParams;
use crate::tools::{Tool, ToolDefinition, ToolOutput, ToolProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

type SharedClient = Arc<RwLock<McpClient>>;

/// Starts an MCP server, exposes its tools, and stops it again.
pub struct McpToolProvider {
    name: String,
    params: McpServerParams,
    settings: McpSettings,
    client: Option<SharedClient>,
}

impl McpToolProvider {
    pub fn new(name: impl Into<String>, params: McpServerParams, settings: McpSettings) -> Self {
        Self {
            name: name.into(),
            params,
            settings,
            client: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.client.is_some()
    }

    fn timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            request: self.settings.request_timeout(),
            shutdown_grace: self.settings.shutdown_grace(),
        }
    }

    async fn connect(&self, client: &SharedClient) -> Result<Vec<McpToolDefinition>, ApiError> {
        let guard = client.read().await;
        guard.initialize().await?;
        guard.list_tools().await
    }
}

#[async_trait]
impl ToolProvider for McpToolProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<Vec<Arc<dyn Tool>>, ApiError> {
        if self.client.is_some() {
            return Err(ApiError::ToolProviderStart {
                name: self.name.clone(),
                reason: "already started".to_string(),
            });
        }
        self.params
            .validate()
            .map_err(|reason| ApiError::ToolProviderStart {
                name: self.name.clone(),
                reason,
            })?;

        let client = McpClient::spawn(self.name.clone(), &self.params, self.timeouts())?;
        let client: SharedClient = Arc::new(RwLock::new(client));

        let definitions = match self.connect(&client).await {
            Ok(definitions) => definitions,
            Err(e) => {
                if let Err(stop_err) = client.write().await.shutdown().await {
                    warn!(provider = %self.name, error = %stop_err, "Cleanup after failed start also failed");
                }
                return Err(ApiError::ToolProviderStart {
                    name: self.name.clone(),
                    reason: e.to_string(),
                });
            }
        };

        info!(
            provider = %self.name,
            tools = definitions.len(),
            "MCP server started"
        );

        let tools = definitions
            .into_iter()
            .map(|def| Arc::new(McpTool::new(def, Arc::clone(&client))) as Arc<dyn Tool>)
            .collect();
        self.client = Some(client);
        Ok(tools)
    }

    async fn stop(&mut self) -> Result<(), ApiError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        let status = client.write().await.shutdown().await?;
        info!(provider = %self.name, status = ?status, "MCP server stopped");
        Ok(())
    }

    fn abort(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match client.try_write() {
            Ok(mut client) => {
                client.start_kill();
                warn!(provider = %self.name, "MCP server killed");
            }
            Err(_) => warn!(provider = %self.name, "MCP client busy, relying on kill on drop"),
        };
    }
}

/// Proxy forwarding calls to the owning server.
pub struct McpTool {
    definition: ToolDefinition,
    client: SharedClient,
}

impl McpTool {
    fn new(def: McpToolDefinition, client: SharedClient) -> Self {
        Self {
            definition: ToolDefinition {
                description: def.description.unwrap_or_else(|| def.name.clone()),
                name: def.name,
                input_schema: def.input_schema,
            },
            client,
        }
    }
}

#[async_trait]
impl Tool for McpTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<ToolOutput, ApiError> {
        let client = self.client.read().await;
        let result = client.call_tool(&self.definition.name, arguments).await?;
        let text = result.flattened_text();
        Ok(if result.is_error {
            ToolOutput::error(text)
        } else {
            ToolOutput::text(text)
        })
    }
}

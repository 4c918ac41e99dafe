//! MCP client over a child process's stdio.
//!
//! Messages are newline-delimited JSON-RPC 2.0. A reader task routes each
//! response to the request waiting on its id; stderr lines are forwarded to
//! `tracing`.

use crate::error::ApiError;
use crate::tools::mcp::protocol::{
    CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    McpToolDefinition, PROTOCOL_VERSION,
};
use crate::tools::mcp::McpServerParams;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Variables passed through when the parent environment is not inherited.
#[cfg(unix)]
const DEFAULT_INHERITED_ENV_VARS: &[&str] = &["HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER"];
#[cfg(windows)]
const DEFAULT_INHERITED_ENV_VARS: &[&str] = &[
    "APPDATA",
    "HOMEDRIVE",
    "HOMEPATH",
    "LOCALAPPDATA",
    "PATH",
    "PROCESSOR_ARCHITECTURE",
    "SYSTEMDRIVE",
    "SYSTEMROOT",
    "TEMP",
    "USERNAME",
    "USERPROFILE",
];

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Timeouts governing one client.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    pub request: Duration,
    pub shutdown_grace: Duration,
}

/// A running MCP server and the connection to it.
pub struct McpClient {
    label: String,
    child: Option<Child>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    timeouts: ClientTimeouts,
}

impl McpClient {
    /// Spawn the server process. No protocol traffic happens yet.
    pub fn spawn(
        label: impl Into<String>,
        params: &McpServerParams,
        timeouts: ClientTimeouts,
    ) -> Result<Self, ApiError> {
        let label = label.into();
        let mut command = Command::new(&params.command);
        command
            .args(&params.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !params.inherit_env {
            command.env_clear();
            for key in DEFAULT_INHERITED_ENV_VARS {
                if let Ok(value) = std::env::var(key) {
                    command.env(key, value);
                }
            }
        }
        command.envs(&params.env);
        if let Some(dir) = &params.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| ApiError::ToolProviderStart {
            name: label.clone(),
            reason: format!("failed to spawn '{}': {}", params.command, e),
        })?;

        let pipes_missing = |pipe: &str| ApiError::ToolProviderStart {
            name: label.clone(),
            reason: format!("failed to capture server {}", pipe),
        };
        let stdin = child.stdin.take().ok_or_else(|| pipes_missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| pipes_missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| pipes_missing("stderr"))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = Arc::clone(&pending);
        let reader_label = label.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(line) {
                            Ok(response) => match response.numeric_id() {
                                Some(id) => {
                                    let waiter = reader_pending.lock().remove(&id);
                                    if let Some(sender) = waiter {
                                        let _ = sender.send(response);
                                    } else {
                                        debug!(server = %reader_label, id, "Response for unknown request id");
                                    }
                                }
                                None => {
                                    debug!(server = %reader_label, message = line, "Server notification ignored");
                                }
                            },
                            Err(e) => {
                                debug!(server = %reader_label, error = %e, "Non JSON-RPC line on stdout");
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(server = %reader_label, "Server stdout closed");
                        break;
                    }
                    Err(e) => {
                        warn!(server = %reader_label, error = %e, "Error reading server stdout");
                        break;
                    }
                }
            }
            // Dropping the senders fails every request still waiting.
            reader_pending.lock().clear();
        });

        let stderr_label = label.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %stderr_label, "{}", line.trim_end());
            }
        });

        debug!(
            server = %label,
            command = %params.command,
            args = ?params.args,
            pid = ?child.id(),
            "Spawned MCP server"
        );

        Ok(Self {
            label,
            child: Some(child),
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            timeouts,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// OS process id while the server is running.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    fn error(&self, reason: impl Into<String>) -> ApiError {
        ApiError::tool_provider(self.label.clone(), reason)
    }

    async fn write_line(&self, message: &JsonRpcRequest) -> Result<(), ApiError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| self.error("connection is closed"))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.error(format!("failed to write to server stdin: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| self.error(format!("failed to flush server stdin: {}", e)))
    }

    /// Send a request and wait for its result.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ApiError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let message = JsonRpcRequest::new(method).with_id(id).with_params(params);
        if let Err(e) = self.write_line(&message).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        let response = match tokio::time::timeout(self.timeouts.request, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(self.error(format!(
                    "server closed the connection before answering '{}'",
                    method
                )))
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(self.error(format!(
                    "request '{}' timed out after {}s",
                    method,
                    self.timeouts.request.as_secs()
                )));
            }
        };

        if let Some(error) = response.error {
            return Err(self.error(format!(
                "'{}' returned error {}: {}",
                method, error.code, error.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub async fn notify(&self, method: &str) -> Result<(), ApiError> {
        self.write_line(&JsonRpcRequest::new(method)).await
    }

    /// Protocol handshake; must precede every other request.
    pub async fn initialize(&self) -> Result<InitializeResult, ApiError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| self.error(format!("invalid initialize result: {}", e)))?;
        self.notify("notifications/initialized").await?;
        info!(
            server = %self.label,
            server_name = %init.server_info.name,
            server_version = %init.server_info.version,
            protocol_version = %init.protocol_version,
            "MCP session initialized"
        );
        Ok(init)
    }

    /// Every tool the server advertises, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, ApiError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| self.error(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, ApiError> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| self.error(format!("invalid tools/call result: {}", e)))
    }

    /// Send the kill signal without waiting for the exit. Used where no
    /// runtime is available to await [`McpClient::shutdown`].
    pub fn start_kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                warn!(server = %self.label, error = %e, "Failed to kill MCP server");
            }
        }
    }

    /// Stop the server: close stdin, wait for a clean exit, kill on overrun.
    ///
    /// Returns `None` when the server was already stopped.
    pub async fn shutdown(&mut self) -> Result<Option<ExitStatus>, ApiError> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        self.stdin.lock().await.take();

        let status = match tokio::time::timeout(self.timeouts.shutdown_grace, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    server = %self.label,
                    grace_ms = self.timeouts.shutdown_grace.as_millis(),
                    "Server did not exit after stdin closed, killing"
                );
                child.kill().await?;
                child.wait().await?
            }
        };
        self.pending.lock().clear();
        debug!(server = %self.label, status = ?status, "MCP server exited");
        Ok(Some(status))
    }
}

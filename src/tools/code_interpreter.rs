//! Code interpreter tool.
//!
//! Runs model-written code through an interpreter, one process per call.
//! With a `sandbox` configured the code runs in a throwaway container and
//! the declared libraries are installed there first. Without one the code
//! runs on the host with the privileges of this process and nothing is
//! installed.

use crate::error::ApiError;
use crate::tools::{Tool, ToolDefinition, ToolOutput, ToolProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const CODE_INTERPRETER_TOOL: &str = "code_interpreter";

/// Exit status the sandbox reports when library installation fails.
const INSTALL_FAILED_STATUS: i32 = 97;

/// Runs inside the container: `$1` holds the libraries, the rest is the
/// interpreter command line.
const INSTALL_THEN_EXEC: &str = "if [ -n \"$1\" ]; then \
pip install --quiet --disable-pip-version-check $1 >&2 || exit 97; fi; shift; exec \"$@\"";

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "python:3.12-slim".to_string()
}

/// Container the code runs in.
///
/// ```toml
/// [tool_providers.sandbox]
/// image = "python:3.12-slim"
/// network = "host"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSandbox {
    /// Container CLI, invoked as `<runtime> run --rm …`.
    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default = "default_image")]
    pub image: String,

    /// `--network` value; the runtime's default network when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl Default for ContainerSandbox {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            image: default_image(),
            network: None,
        }
    }
}

/// How model-written code is executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeInterpreterConfig {
    /// Interpreter binary.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Arguments placed before the code, which is passed as the last argument.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Wall-clock limit per execution; the process is killed when exceeded.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bytes kept from each of stdout and stderr; the rest is dropped.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Host directory the code runs in. Ignored inside a sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<ContainerSandbox>,
}

impl Default for CodeInterpreterConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
            working_dir: None,
            sandbox: None,
        }
    }
}

impl CodeInterpreterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.interpreter.trim().is_empty() {
            return Err("interpreter cannot be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be positive".to_string());
        }
        if self.max_output_bytes == 0 {
            return Err("max_output_bytes must be positive".to_string());
        }
        if let Some(sandbox) = &self.sandbox {
            if sandbox.runtime.trim().is_empty() {
                return Err("sandbox runtime cannot be empty".to_string());
            }
            if sandbox.image.trim().is_empty() {
                return Err("sandbox image cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CodeArguments {
    code: String,
    #[serde(default)]
    libraries_used: Vec<String>,
}

/// Package requirement as pip accepts it, e.g. `requests` or `lxml>=5`.
fn is_valid_library(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-=<>!~[],".contains(c))
}

/// One output stream, cut off after a byte limit but read to the end.
struct Captured {
    bytes: Vec<u8>,
    total: usize,
}

impl Captured {
    fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.total > self.bytes.len() {
            text.push_str(&format!(
                "\n[output truncated: {} of {} bytes shown]\n",
                self.bytes.len(),
                self.total
            ));
        }
        text
    }
}

async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut total = 0;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n;
        let room = limit.saturating_sub(bytes.len());
        bytes.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(Captured { bytes, total })
}

/// Tool that executes a code snippet and returns its output.
pub struct CodeInterpreterTool {
    definition: ToolDefinition,
    config: CodeInterpreterConfig,
}

impl CodeInterpreterTool {
    pub fn new(config: CodeInterpreterConfig) -> Self {
        let libraries = if config.sandbox.is_some() {
            "Libraries the code imports; they are installed before it runs."
        } else {
            "Libraries the code imports. Only already installed libraries are available."
        };
        let definition = ToolDefinition {
            name: CODE_INTERPRETER_TOOL.to_string(),
            description: format!(
                "Executes code with `{}` and returns what it prints. Always print the final \
                 result; the return value of the last expression is not captured.",
                config.interpreter
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Complete source code to execute."
                    },
                    "libraries_used": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": libraries
                    }
                },
                "required": ["code"]
            }),
        };
        Self { definition, config }
    }

    /// The command for one execution, and the container name when sandboxed.
    fn command(&self, code: &str, libraries: &[String]) -> (Command, Option<String>) {
        let config = &self.config;
        let Some(sandbox) = &config.sandbox else {
            let mut command = Command::new(&config.interpreter);
            command.args(&config.args).arg(code);
            if let Some(dir) = &config.working_dir {
                command.current_dir(dir);
            }
            return (command, None);
        };

        let name = format!(
            "nextvuln-code-{}-{}",
            std::process::id(),
            CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let mut command = Command::new(&sandbox.runtime);
        command.args(["run", "--rm", "--name", name.as_str()]);
        if let Some(network) = &sandbox.network {
            command.args(["--network", network.as_str()]);
        }
        command
            .arg(&sandbox.image)
            .args(["sh", "-c", INSTALL_THEN_EXEC, "sandbox"])
            .arg(libraries.join(" "))
            .arg(&config.interpreter)
            .args(&config.args)
            .arg(code);
        (command, Some(name))
    }

    async fn remove_container(&self, name: &str) {
        let Some(sandbox) = &self.config.sandbox else {
            return;
        };
        let removed = Command::new(&sandbox.runtime)
            .args(["rm", "-f", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match removed {
            Ok(status) if status.success() => debug!(container = %name, "Container removed"),
            Ok(status) => warn!(container = %name, status = ?status.code(), "Container removal failed"),
            Err(e) => warn!(container = %name, error = %e, "Container removal failed"),
        }
    }

    async fn run(&self, code: &str, libraries: &[String]) -> Result<ToolOutput, ApiError> {
        let (mut command, container) = self.command(code, libraries);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let program = command.as_std().get_program().to_string_lossy().into_owned();
        let mut child = command.spawn().map_err(|e| {
            ApiError::tool_provider(
                CODE_INTERPRETER_TOOL,
                format!("failed to run '{}': {}", program, e),
            )
        })?;
        let pipes_missing = || ApiError::tool_provider(CODE_INTERPRETER_TOOL, "failed to capture output");
        let stdout = child.stdout.take().ok_or_else(pipes_missing)?;
        let stderr = child.stderr.take().ok_or_else(pipes_missing)?;

        let started = Instant::now();
        let cap = self.config.max_output_bytes;
        let execution = async {
            let (stdout, stderr, status) = tokio::join!(
                read_capped(stdout, cap),
                read_capped(stderr, cap),
                child.wait()
            );
            Ok::<_, std::io::Error>((stdout?, stderr?, status?))
        };
        let limit = Duration::from_secs(self.config.timeout_secs);
        let finished = tokio::time::timeout(limit, execution).await;

        let (stdout, stderr, status) = match finished {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    timeout_secs = self.config.timeout_secs,
                    "Code execution timed out, process killed"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out execution");
                }
                if let Some(name) = &container {
                    self.remove_container(name).await;
                }
                return Ok(ToolOutput::error(format!(
                    "Execution timed out after {}s and was terminated",
                    self.config.timeout_secs
                )));
            }
        };

        debug!(
            status = ?status.code(),
            stdout_bytes = stdout.total,
            stderr_bytes = stderr.total,
            sandboxed = container.is_some(),
            duration_ms = started.elapsed().as_millis(),
            "Code execution finished"
        );

        let mut text = stdout.text();
        let stderr = stderr.text();
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(&stderr);
        }

        if status.success() {
            if text.trim().is_empty() {
                text = "Code executed successfully with no output".to_string();
            }
            return Ok(ToolOutput::text(text));
        }
        if container.is_some() && status.code() == Some(INSTALL_FAILED_STATUS) {
            return Ok(ToolOutput::error(format!(
                "Installing {} failed\n{}",
                libraries.join(", "),
                text
            )));
        }
        let status = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        Ok(ToolOutput::error(format!(
            "Execution failed (exit status {})\n{}",
            status, text
        )))
    }
}

#[async_trait]
impl Tool for CodeInterpreterTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<ToolOutput, ApiError> {
        let args: CodeArguments = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolOutput::error(format!(
                    "Invalid arguments for {}: {}",
                    CODE_INTERPRETER_TOOL, e
                )))
            }
        };
        if let Some(bad) = args.libraries_used.iter().find(|l| !is_valid_library(l)) {
            return Ok(ToolOutput::error(format!(
                "Invalid library name '{}' in libraries_used",
                bad
            )));
        }
        let libraries: &[String] = if self.config.sandbox.is_some() {
            &args.libraries_used
        } else {
            if !args.libraries_used.is_empty() {
                // Nothing is installed on the host.
                debug!(libraries = ?args.libraries_used, "Code declares libraries");
            }
            &[]
        };
        self.run(&args.code, libraries).await
    }
}

/// In-process provider exposing a single [`CodeInterpreterTool`].
pub struct CodeInterpreterProvider {
    name: String,
    config: CodeInterpreterConfig,
    running: bool,
}

impl CodeInterpreterProvider {
    pub fn new(name: impl Into<String>, config: CodeInterpreterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            running: false,
        }
    }
}

#[async_trait]
impl ToolProvider for CodeInterpreterProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<Vec<Arc<dyn Tool>>, ApiError> {
        self.config.validate().map_err(|reason| ApiError::ToolProviderStart {
            name: self.name.clone(),
            reason,
        })?;
        self.running = true;
        info!(
            provider = %self.name,
            interpreter = %self.config.interpreter,
            sandbox = ?self.config.sandbox.as_ref().map(|s| s.image.as_str()),
            "Code interpreter ready"
        );
        Ok(vec![Arc::new(CodeInterpreterTool::new(self.config.clone()))])
    }

    async fn stop(&mut self) -> Result<(), ApiError> {
        if self.running {
            self.running = false;
            info!(provider = %self.name, "Code interpreter stopped");
        }
        Ok(())
    }
}

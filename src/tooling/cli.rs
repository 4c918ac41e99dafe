//! CLI Tooling
//!
//! Command-line interface for running, checking and listing crews.

use crate::config::{AppConfig, ConfigLoader, LlmCredentials};
use crate::crew::config::{resolve_crew, validate_crew, CrewSource, ValidationReport};
use crate::crew::{presets, CrewOutput};
use crate::error::ApiError;
use crate::logging::{init_logging, LoggingConfig};
use crate::provider::{ModelProviderClient, OpenAiCompatibleClient, ProviderConfig};
use crate::tooling::signal::shutdown_signal;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// nextvuln - sequential multi-agent crews for vulnerability work
#[derive(Parser)]
#[command(name = "nextvuln")]
#[command(about = "Run crews of language-model agents that share tools over MCP")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run a crew (preset name or crew file)
    Run {
        crew: String,
        /// Placeholder value, repeatable: --input url=http://localhost:3000
        #[arg(long = "input", short = 'i', value_parser = parse_input)]
        inputs: Vec<(String, String)>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Check a crew without calling the model or starting tools
    Validate {
        crew: String,
        #[arg(long = "input", short = 'i', value_parser = parse_input)]
        inputs: Vec<(String, String)>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List built-in crews
    Crews {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Send one prompt to the configured model
    Ping {
        #[arg(default_value = "Reply with the single word: pong")]
        message: String,
    },
}

/// Parse a `key=value` input.
pub fn parse_input(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("input key cannot be empty in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

/// CLI context: loaded configuration plus command dispatch.
pub struct CliContext {
    config: AppConfig,
}

impl CliContext {
    /// Load configuration from `config_path`, or the standard locations.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match &config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&std::env::current_dir()?)?,
        };
        Ok(Self { config })
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Install the global logger, with command-line flags over configuration.
    pub fn init_logging(&self, cli: &Cli) -> Result<(), ApiError> {
        init_logging(Some(&self.logging_config(cli)))
    }

    fn logging_config(&self, cli: &Cli) -> LoggingConfig {
        let mut logging = self.config.logging.clone();
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            logging.file = Some(file.clone());
        }
        logging
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Run {
                crew,
                inputs,
                format,
            } => self.run(crew, &input_map(inputs), format),
            Commands::Validate {
                crew,
                inputs,
                format,
            } => self.validate(crew, &input_map(inputs), format),
            Commands::Crews { format } => format_presets(format),
            Commands::Ping { message } => self.ping(message),
        }
    }

    /// Model client from the environment credentials.
    fn model_client(&self) -> Result<Arc<dyn ModelProviderClient>, ApiError> {
        let credentials = LlmCredentials::from_env(&self.config.llm)?;
        let provider = ProviderConfig::from_credentials(&credentials, &self.config.llm);
        Ok(Arc::new(OpenAiCompatibleClient::new(provider)?))
    }

    fn runtime() -> Result<tokio::runtime::Runtime, ApiError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(ApiError::from)
    }

    fn run(
        &self,
        crew_arg: &str,
        inputs: &HashMap<String, String>,
        format: &str,
    ) -> Result<String, ApiError> {
        check_format(format)?;
        // Nothing is built or started without working credentials.
        let llm = self.model_client()?;
        let (config, base_dir, source) = resolve_crew(crew_arg)?;
        let report = validate_crew(&config, &base_dir, inputs);
        if !report.is_valid() {
            return Err(ApiError::ConfigError(format!(
                "Crew '{}' is not runnable:\n{}",
                config.name,
                format_report_problems(&report)
            )));
        }

        let mut crew = config.build(llm, &self.config.mcp, &base_dir)?;
        info!(crew = %crew.name(), source = ?source, "Crew loaded");

        let output = Self::runtime()?.block_on(async {
            // Handlers go in before any provider process is spawned.
            let shutdown = shutdown_signal();
            crew.kickoff_until(inputs, shutdown).await
        })?;
        match format {
            "json" => Ok(serde_json::to_string_pretty(&output)?),
            _ => Ok(format_crew_output(&output)),
        }
    }

    fn validate(
        &self,
        crew_arg: &str,
        inputs: &HashMap<String, String>,
        format: &str,
    ) -> Result<String, ApiError> {
        check_format(format)?;
        let (config, base_dir, source) = resolve_crew(crew_arg)?;
        let report = validate_crew(&config, &base_dir, inputs);
        match format {
            "json" => {
                let mut value = serde_json::to_value(&report)?;
                value["valid"] = serde_json::Value::Bool(report.is_valid());
                value["missing_inputs"] = serde_json::to_value(report.missing_inputs())?;
                value["source"] = serde_json::Value::String(match source {
                    CrewSource::Preset(name) => format!("preset:{}", name),
                    CrewSource::File(path) => path.display().to_string(),
                });
                Ok(serde_json::to_string_pretty(&value)?)
            }
            _ => Ok(format_report(&report)),
        }
    }

    fn ping(&self, message: &str) -> Result<String, ApiError> {
        let llm = self.model_client()?;
        info!(model = %llm.model(), "Pinging model");
        Self::runtime()?.block_on(llm.call(message))
    }
}

fn input_map(inputs: &[(String, String)]) -> HashMap<String, String> {
    inputs.iter().cloned().collect()
}

fn check_format(format: &str) -> Result<(), ApiError> {
    match format {
        "text" | "json" => Ok(()),
        other => Err(ApiError::ConfigError(format!(
            "Invalid output format: {} (must be 'text' or 'json')",
            other
        ))),
    }
}

fn format_presets(format: &str) -> Result<String, ApiError> {
    check_format(format)?;
    let crews = presets::all()?;
    if format == "json" {
        let arr: Vec<serde_json::Value> = crews
            .iter()
            .map(|c| {
                serde_json::json!({
                    "name": c.name,
                    "description": c.description,
                    "agents": c.agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                    "tasks": c.tasks.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                    "tool_providers": c.tool_providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                    "inputs": c.inputs,
                })
            })
            .collect();
        return Ok(serde_json::to_string_pretty(&arr)?);
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Crew", "Agents", "Tasks", "Tool providers", "Description"]);
    for crew in &crews {
        let providers = crew
            .tool_providers
            .iter()
            .map(|p| format!("{} ({})", p.name, p.kind_slug()))
            .collect::<Vec<_>>();
        table.add_row(vec![
            crew.name.clone(),
            crew.agents.len().to_string(),
            crew.tasks.len().to_string(),
            if providers.is_empty() {
                "-".to_string()
            } else {
                providers.join("\n")
            },
            crew.description.clone().unwrap_or_default(),
        ]);
    }
    Ok(table.to_string())
}

fn format_report_problems(report: &ValidationReport) -> String {
    let mut lines: Vec<String> = report.errors.iter().map(|e| format!("  - {}", e)).collect();
    for template in report.templates.iter().filter(|t| !t.missing.is_empty()) {
        lines.push(format!(
            "  - {} needs input(s): {}",
            template.location,
            template.missing.join(", ")
        ));
    }
    lines.join("\n")
}

fn format_report(report: &ValidationReport) -> String {
    let mut out = format!("{}\n\n", format!("Crew '{}'", report.crew).bold().underline());

    if !report.inputs.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Input", "Value"]);
        for (key, value) in &report.inputs {
            table.add_row(vec![key.as_str(), value.as_str()]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    if report.is_valid() {
        out.push_str(&format!("{}\n", "Valid: ready to run".green()));
    } else {
        out.push_str(&format!("{}\n", "Invalid:".red().bold()));
        out.push_str(&format_report_problems(report));
        out.push('\n');
        let missing = report.missing_inputs();
        if !missing.is_empty() {
            let flags = missing
                .iter()
                .map(|m| format!("--input {}=...", m))
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&format!("\nSupply the missing inputs with: {}\n", flags));
        }
    }
    out
}

fn format_crew_output(output: &CrewOutput) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Task", "Agent", "Duration", "Tool calls", "Tokens"]);
    for (index, task) in output.tasks_output.iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            task.task.clone(),
            task.agent.clone(),
            format!("{:.1}s", task.duration_ms() as f64 / 1000.0),
            task.tool_calls.to_string(),
            task.usage.total_tokens.to_string(),
        ]);
    }

    let mut out = format!("{}\n\n", format!("Crew '{}'", output.crew).bold().underline());
    out.push_str(&format!("{}\n\n", table));
    out.push_str(&format!(
        "Total tokens: {} across {} requests\n\n",
        output.usage.total_tokens, output.usage.successful_requests
    ));
    out.push_str(&format!("{}\n\n", "Final answer".bold()));
    out.push_str(&output.raw);
    out
}

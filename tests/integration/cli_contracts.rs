//! Command-line contracts: argument parsing and command output.

use clap::Parser;
use nextvuln::config::{AppConfig, LlmSettings};
use nextvuln::error::ApiError;
use nextvuln::tooling::{Cli, CliContext, Commands};
use tempfile::TempDir;

fn context() -> CliContext {
    CliContext::with_config(AppConfig::default())
}

fn parse(args: &[&str]) -> Commands {
    let mut argv = vec!["nextvuln"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().command
}

/// Config whose credential variables are never set.
fn unset_credentials() -> AppConfig {
    AppConfig {
        llm: LlmSettings {
            model_env: "NEXTVULN_TEST_UNSET_MODEL_5k2".to_string(),
            base_url_env: "NEXTVULN_TEST_UNSET_BASE_5k2".to_string(),
            api_key_env: "NEXTVULN_TEST_UNSET_KEY_5k2".to_string(),
            ..LlmSettings::default()
        },
        ..AppConfig::default()
    }
}

#[test]
fn run_parses_repeated_inputs() {
    let command = parse(&[
        "run",
        "nextvuln",
        "--input",
        "url=http://localhost:3000/?a=b",
        "-i",
        "scan_tool=nmap",
        "--format",
        "json",
    ]);
    assert_eq!(
        command,
        Commands::Run {
            crew: "nextvuln".to_string(),
            inputs: vec![
                ("url".to_string(), "http://localhost:3000/?a=b".to_string()),
                ("scan_tool".to_string(), "nmap".to_string()),
            ],
            format: "json".to_string(),
        }
    );
}

#[test]
fn malformed_input_is_rejected_by_the_parser() {
    let argv = ["nextvuln", "validate", "nextvuln", "--input", "url"];
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn crews_lists_every_preset_as_json() {
    let output = context()
        .execute(&Commands::Crews {
            format: "json".to_string(),
        })
        .unwrap();
    let crews: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
    let names: Vec<&str> = crews.iter().filter_map(|c| c["name"].as_str()).collect();
    assert_eq!(names, vec!["nextvuln", "vuln-triage", "market-research"]);
    assert_eq!(crews[0]["tool_providers"], serde_json::json!(["code", "defectdojo", "git"]));
}

#[test]
fn crews_table_names_each_preset() {
    let output = context().execute(&parse(&["crews"])).unwrap();
    for name in ["nextvuln", "vuln-triage", "market-research"] {
        assert!(output.contains(name), "{}", output);
    }
}

#[test]
fn validate_json_reports_missing_inputs() {
    let output = context()
        .execute(&parse(&["validate", "nextvuln", "--format", "json"]))
        .unwrap();
    let report: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(report["valid"], false);
    assert_eq!(report["missing_inputs"], serde_json::json!(["scan_tool", "url"]));
    assert_eq!(report["source"], "preset:nextvuln");

    let output = context()
        .execute(&parse(&[
            "validate",
            "nextvuln",
            "-i",
            "url=http://localhost:3000",
            "-i",
            "scan_tool=nmap",
            "--format",
            "json",
        ]))
        .unwrap();
    let report: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(report["valid"], true);
    assert_eq!(report["inputs"]["url"], "http://localhost:3000");
}

#[test]
fn validate_text_suggests_input_flags() {
    let output = context()
        .execute(&parse(&["validate", "nextvuln"]))
        .unwrap();
    assert!(output.contains("--input scan_tool=..."), "{}", output);
    assert!(output.contains("--input url=..."), "{}", output);
}

#[test]
fn unknown_crew_names_the_presets() {
    let err = context()
        .execute(&parse(&["validate", "no-such-crew"]))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("no-such-crew"), "{}", message);
    assert!(message.contains("market-research"), "{}", message);
}

#[cfg(unix)]
#[test]
fn run_without_credentials_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("started");
    let crew = format!(
        r#"
name = "marker"

[[tool_providers]]
name = "touchy"
type = "mcp"
command = "sh"
args = ["-c", "touch '{}'"]

[[agents]]
name = "a"
role = "r"
goal = "g"
backstory = "b"
tools = ["touchy"]

[[tasks]]
name = "t"
agent = "a"
description = "d"
expected_output = "e"
"#,
        marker.display()
    );
    let crew_path = dir.path().join("crew.toml");
    std::fs::write(&crew_path, crew).unwrap();

    let context = CliContext::with_config(unset_credentials());
    let err = context
        .execute(&parse(&["run", crew_path.to_str().unwrap()]))
        .unwrap_err();

    assert!(
        matches!(&err, ApiError::MissingCredential(var) if var.starts_with("NEXTVULN_TEST_UNSET_")),
        "{:?}",
        err
    );
    assert!(!marker.exists());
}

#[test]
fn ping_without_credentials_fails() {
    let context = CliContext::with_config(unset_credentials());
    let err = context.execute(&parse(&["ping"])).unwrap_err();
    assert!(matches!(err, ApiError::MissingCredential(_)), "{:?}", err);
}

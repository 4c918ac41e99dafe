//! Crews built from TOML files, run end to end with a scripted model.

use super::support::{answer, observations, task_of, tool_call, ScriptedModel};
use nextvuln::config::McpSettings;
use nextvuln::crew::{validate_crew, CrewConfig};
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;

const PROBE_CREW: &str = r#"
name = "probe"

[inputs]
url = "http://localhost:3000"

[[tool_providers]]
name = "code"
type = "code_interpreter"
interpreter = "sh"
args = ["-c"]
timeout_secs = 10

[[agents]]
name = "hacker"
role = "Ethical Hacker"
goal = "Probe {url}"
backstory = { file = "prompts/hacker.md" }
tools = ["code"]

[[agents]]
name = "writer"
role = "Report Writer"
goal = "Summarise"
backstory = "Writes clearly."

[[tasks]]
name = "probe"
agent = "hacker"
description = "Probe {url} using {scan_tool}"
expected_output = "Raw findings"

[[tasks]]
name = "report"
agent = "writer"
description = "Write up the findings for {url}"
expected_output = { file = "prompts/report.md" }
"#;

fn crew_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("prompts")).unwrap();
    std::fs::write(dir.path().join("prompts/hacker.md"), "You break {url} for a living.\n").unwrap();
    std::fs::write(dir.path().join("prompts/report.md"), "A one page report\n").unwrap();
    std::fs::write(dir.path().join("crew.toml"), PROBE_CREW).unwrap();
    dir
}

#[test]
fn validation_reports_missing_inputs_per_field() {
    let dir = crew_dir();
    let config = CrewConfig::load(&dir.path().join("crew.toml")).unwrap();

    let report = validate_crew(&config, dir.path(), &HashMap::new());
    assert!(!report.is_valid());
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.missing_inputs(), vec!["scan_tool".to_string()]);
    let missing_at: Vec<&str> = report
        .templates
        .iter()
        .filter(|t| !t.missing.is_empty())
        .map(|t| t.location.as_str())
        .collect();
    assert_eq!(missing_at.len(), 1);
    assert!(missing_at[0].contains("probe"), "{:?}", missing_at);

    let inputs = HashMap::from([("scan_tool".to_string(), "curl".to_string())]);
    assert!(validate_crew(&config, dir.path(), &inputs).is_valid());
}

#[test]
fn missing_prompt_file_is_a_validation_error() {
    let dir = crew_dir();
    std::fs::remove_file(dir.path().join("prompts/report.md")).unwrap();
    let config = CrewConfig::load(&dir.path().join("crew.toml")).unwrap();

    let inputs = HashMap::from([("scan_tool".to_string(), "curl".to_string())]);
    let report = validate_crew(&config, dir.path(), &inputs);

    assert!(!report.is_valid());
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("report.md"), "{}", report.errors[0]);
}

#[cfg(unix)]
#[tokio::test]
async fn crew_file_runs_with_a_real_code_interpreter() {
    let dir = crew_dir();
    let config = CrewConfig::load(&dir.path().join("crew.toml")).unwrap();
    let model = ScriptedModel::new(|request, index| {
        if task_of(request).starts_with("Probe") {
            if index == 0 {
                return Ok(tool_call(
                    "run-1",
                    "code_interpreter",
                    json!({"code": "echo status 200", "libraries_used": ["requests"]}),
                ));
            }
            return Ok(answer(&format!("observed: {}", observations(request).join(""))));
        }
        Ok(answer("Report: the site answered with status 200"))
    });

    let mut crew = config
        .build(model.clone(), &McpSettings::default(), dir.path())
        .unwrap();
    let inputs = HashMap::from([("scan_tool".to_string(), "curl".to_string())]);
    let output = crew.kickoff(&inputs).await.unwrap();

    assert_eq!(output.crew, "probe");
    assert_eq!(output.tasks_output.len(), 2);
    assert_eq!(output.tasks_output[0].raw, "observed: status 200");
    assert_eq!(output.tasks_output[0].tool_calls, 1);
    assert_eq!(output.raw, "Report: the site answered with status 200");

    let requests = model.requests();
    assert_eq!(task_of(&requests[0]), "Probe http://localhost:3000 using curl");
    assert!(super::support::system_prompt(&requests[0])
        .contains("You break http://localhost:3000 for a living."));
    assert!(super::support::user_prompt(requests.last().unwrap()).contains("A one page report"));
    assert!(super::support::user_prompt(requests.last().unwrap())
        .contains("observed: status 200"));
}

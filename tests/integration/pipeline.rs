//! Crew runs driven by scripted models and counting tool providers.

use super::support::{
    answer, count, observations, system_prompt, task_of, tool_call, user_prompt, CountingProvider,
    Journal, ScriptedModel,
};
use nextvuln::agent::Agent;
use nextvuln::crew::runner::CONTEXT_SEPARATOR;
use nextvuln::crew::{Crew, Task};
use nextvuln::error::ApiError;
use nextvuln::provider::ModelProviderClient;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn agent(name: &str, llm: Arc<dyn ModelProviderClient>) -> Agent {
    Agent::new(
        name,
        format!("{} role", name),
        format!("{} goal", name),
        format!("{} backstory", name),
        llm,
    )
}

fn task(name: &str, agent: &str) -> Task {
    Task::new(name, format!("work on {}", name), format!("{} report", name), agent)
}

fn no_inputs() -> HashMap<String, String> {
    HashMap::new()
}

#[tokio::test]
async fn tasks_run_in_order_and_see_earlier_answers() {
    let model = ScriptedModel::echo();
    let mut crew = Crew::builder("ordered")
        .agent(agent("writer", model.clone()))
        .task(task("first", "writer"))
        .task(task("second", "writer"))
        .task(task("third", "writer"))
        .build()
        .unwrap();

    let output = crew.kickoff(&no_inputs()).await.unwrap();

    assert_eq!(
        model.tasks_seen(),
        vec!["work on first", "work on second", "work on third"]
    );
    let names: Vec<&str> = output.tasks_output.iter().map(|t| t.task.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    assert_eq!(output.raw, "done: work on third");
    assert_eq!(output.usage.successful_requests, 3);
    assert_eq!(output.usage.total_tokens, 45);

    let requests = model.requests();
    assert!(!user_prompt(&requests[0]).contains(CONTEXT_SEPARATOR));
    let third = user_prompt(&requests[2]);
    assert!(third.contains(&format!(
        "done: work on first{}done: work on second",
        CONTEXT_SEPARATOR
    )));
}

#[tokio::test]
async fn inputs_reach_every_prompt_and_defaults_are_overridden() {
    let model = ScriptedModel::echo();
    let mut crew = Crew::builder("templated")
        .agent(Agent::new(
            "hacker",
            "Tester of {target}",
            "Break {target}",
            "You know {tool} well.",
            model.clone(),
        ))
        .task(Task::new("scan", "Scan {target} with {tool}", "Findings for {target}", "hacker"))
        .default_inputs(HashMap::from([
            ("target".to_string(), "http://default".to_string()),
            ("tool".to_string(), "nmap".to_string()),
        ]))
        .build()
        .unwrap();

    let inputs = HashMap::from([("target".to_string(), "http://localhost:3000".to_string())]);
    let output = crew.kickoff(&inputs).await.unwrap();

    let request = &model.requests()[0];
    assert!(system_prompt(request).contains("You are Tester of http://localhost:3000."));
    assert!(system_prompt(request).contains("You know nmap well."));
    assert_eq!(task_of(request), "Scan http://localhost:3000 with nmap");
    assert_eq!(output.tasks_output[0].description, "Scan http://localhost:3000 with nmap");
}

#[tokio::test]
async fn failing_task_stops_the_run_and_every_provider() {
    let journal = Journal::default();
    let code = CountingProvider::new("code", &journal);
    let git = CountingProvider::new("git", &journal);
    let (code_starts, code_stops) = code.counters();
    let (git_starts, git_stops) = git.counters();

    let model = ScriptedModel::new(|request, _| {
        let task = task_of(request);
        if task.contains("second") {
            Err(ApiError::ProviderRequestFailed("upstream 502".to_string()))
        } else {
            Ok(answer(&format!("done: {}", task)))
        }
    });
    let mut crew = Crew::builder("failing")
        .agent(agent("a", model.clone()).with_tools(["code", "git"]))
        .task(task("first", "a"))
        .task(task("second", "a"))
        .task(task("third", "a"))
        .tool_provider(Box::new(code))
        .tool_provider(Box::new(git))
        .build()
        .unwrap();

    let err = crew.kickoff(&no_inputs()).await.unwrap_err();

    match err {
        ApiError::TaskFailed { task, reason } => {
            assert_eq!(task, "second");
            assert!(reason.contains("upstream 502"), "{}", reason);
        }
        other => panic!("expected TaskFailed, got {:?}", other),
    }
    assert_eq!(model.tasks_seen(), vec!["work on first", "work on second"]);
    assert_eq!((count(&code_starts), count(&code_stops)), (1, 1));
    assert_eq!((count(&git_starts), count(&git_stops)), (1, 1));
    assert_eq!(
        journal.events(),
        vec!["start:code", "start:git", "stop:git", "stop:code"]
    );
}

#[tokio::test]
async fn missing_input_fails_before_any_provider_starts() {
    let journal = Journal::default();
    let provider = CountingProvider::new("code", &journal);
    let model = ScriptedModel::echo();
    let mut crew = Crew::builder("unfilled")
        .agent(agent("a", model.clone()).with_tools(["code"]))
        .task(Task::new("scan", "Scan {url}", "Findings", "a"))
        .tool_provider(Box::new(provider))
        .build()
        .unwrap();

    let err = crew.kickoff(&no_inputs()).await.unwrap_err();

    assert!(matches!(err, ApiError::Template { .. }), "{:?}", err);
    assert!(err.to_string().contains("url"), "{}", err);
    assert!(journal.events().is_empty());
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn provider_start_failure_stops_the_ones_already_running() {
    let journal = Journal::default();
    let first = CountingProvider::new("first", &journal);
    let broken = CountingProvider::new("broken", &journal).failing_start();
    let never = CountingProvider::new("never", &journal);
    let (never_starts, _) = never.counters();
    let model = ScriptedModel::echo();

    let mut crew = Crew::builder("broken-tools")
        .agent(agent("a", model.clone()))
        .task(task("only", "a"))
        .tool_provider(Box::new(first))
        .tool_provider(Box::new(broken))
        .tool_provider(Box::new(never))
        .build()
        .unwrap();

    let err = crew.kickoff(&no_inputs()).await.unwrap_err();

    assert!(
        matches!(&err, ApiError::ToolProviderStart { name, .. } if name == "broken"),
        "{:?}",
        err
    );
    assert_eq!(
        journal.events(),
        vec!["start:first", "start:broken", "stop:first"]
    );
    assert_eq!(count(&never_starts), 0);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn cleanup_failure_after_success_is_reported() {
    let journal = Journal::default();
    let sticky = CountingProvider::new("sticky", &journal).failing_stop();
    let other = CountingProvider::new("other", &journal);
    let (_, other_stops) = other.counters();
    let mut crew = Crew::builder("sticky")
        .agent(agent("a", ScriptedModel::echo()))
        .task(task("only", "a"))
        .tool_provider(Box::new(other))
        .tool_provider(Box::new(sticky))
        .build()
        .unwrap();

    let err = crew.kickoff(&no_inputs()).await.unwrap_err();

    assert!(err.to_string().contains("stop failed"), "{}", err);
    assert_eq!(count(&other_stops), 1);
}

#[tokio::test]
async fn tool_results_are_fed_back_to_the_model() {
    let journal = Journal::default();
    let model = ScriptedModel::new(|request, index| match index {
        0 => Ok(tool_call("call-1", "code_echo", json!({"code": "print(1)"}))),
        1 => Ok(tool_call("call-2", "nmap", json!({}))),
        2 => Ok(tool_call("call-3", "code_echo", json!({"fail": true}))),
        _ => Ok(answer(&observations(request).join(" | "))),
    });
    let mut crew = Crew::builder("tools")
        .agent(agent("hacker", model.clone()).with_tools(["code"]))
        .task(task("probe", "hacker"))
        .tool_provider(Box::new(CountingProvider::new("code", &journal)))
        .build()
        .unwrap();

    let output = crew.kickoff(&no_inputs()).await.unwrap();

    let task = &output.tasks_output[0];
    assert_eq!(task.tool_calls, 3);
    assert!(task.raw.contains(r#"echo {"code":"print(1)"}"#), "{}", task.raw);
    assert!(
        task.raw
            .contains("Error: tool 'nmap' does not exist. Available tools: code_echo"),
        "{}",
        task.raw
    );
    assert!(task.raw.contains("Error: echo refused"), "{}", task.raw);

    let first = &model.requests()[0];
    assert_eq!(first.tools.len(), 1);
    assert_eq!(first.tools[0].name, "code_echo");
}

#[tokio::test]
async fn agents_only_see_their_own_providers_tools() {
    let journal = Journal::default();
    let model = ScriptedModel::echo();
    let mut crew = Crew::builder("scoped")
        .agent(agent("hacker", model.clone()).with_tools(["code"]))
        .agent(agent("writer", model.clone()))
        .task(task("probe", "hacker"))
        .task(task("summary", "writer"))
        .tool_provider(Box::new(CountingProvider::new("code", &journal)))
        .build()
        .unwrap();

    crew.kickoff(&no_inputs()).await.unwrap();

    let requests = model.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert!(requests[1].tools.is_empty());
}

#[tokio::test]
async fn iteration_limit_forces_an_answer_without_tools() {
    let journal = Journal::default();
    let model = ScriptedModel::new(|request, _| {
        if request.tools.is_empty() {
            Ok(answer("forced answer"))
        } else {
            Ok(tool_call("loop", "code_echo", json!({})))
        }
    });
    let mut crew = Crew::builder("looping")
        .agent(
            agent("a", model.clone())
                .with_tools(["code"])
                .with_max_iterations(2),
        )
        .task(task("only", "a"))
        .tool_provider(Box::new(CountingProvider::new("code", &journal)))
        .build()
        .unwrap();

    let output = crew.kickoff(&no_inputs()).await.unwrap();

    assert_eq!(output.raw, "forced answer");
    assert_eq!(output.tasks_output[0].tool_calls, 2);
    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[2].tools.is_empty());
}

#[tokio::test]
async fn empty_final_answer_fails_the_task() {
    let mut crew = Crew::builder("silent")
        .agent(agent("a", ScriptedModel::new(|_, _| Ok(answer("   ")))))
        .task(task("only", "a"))
        .build()
        .unwrap();

    let err = crew.kickoff(&no_inputs()).await.unwrap_err();
    assert!(matches!(&err, ApiError::TaskFailed { task, .. } if task == "only"), "{:?}", err);
}

#[tokio::test]
async fn shutdown_interrupts_the_run_and_stops_providers() {
    let journal = Journal::default();
    let provider = CountingProvider::new("code", &journal);
    let (starts, stops) = provider.counters();
    let slow = Arc::new(SlowModel);
    let mut crew = Crew::builder("slow")
        .agent(agent("a", slow).with_tools(["code"]))
        .task(task("only", "a"))
        .tool_provider(Box::new(provider))
        .build()
        .unwrap();

    let err = crew
        .kickoff_until(&no_inputs(), tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Interrupted), "{:?}", err);
    assert_eq!((count(&starts), count(&stops)), (1, 1));
}

#[tokio::test]
async fn shutdown_while_providers_start_stops_the_started_ones() {
    let journal = Journal::default();
    let fast = CountingProvider::new("fast", &journal);
    let slow = CountingProvider::new("slow", &journal).with_start_delay(Duration::from_secs(3));
    let model = ScriptedModel::echo();
    let mut crew = Crew::builder("starting")
        .agent(agent("a", model.clone()).with_tools(["fast", "slow"]))
        .task(task("only", "a"))
        .tool_provider(Box::new(fast))
        .tool_provider(Box::new(slow))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let err = crew
        .kickoff_until(&no_inputs(), tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Interrupted), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(journal.events(), vec!["start:fast", "start:slow", "stop:fast"]);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn dropped_run_aborts_started_providers() {
    let journal = Journal::default();
    let mut crew = Crew::builder("dropped")
        .agent(agent("a", Arc::new(SlowModel)).with_tools(["code", "git"]))
        .task(task("only", "a"))
        .tool_provider(Box::new(CountingProvider::new("code", &journal)))
        .tool_provider(Box::new(CountingProvider::new("git", &journal)))
        .build()
        .unwrap();

    let cancelled = tokio::time::timeout(Duration::from_millis(50), crew.kickoff(&no_inputs())).await;

    assert!(cancelled.is_err());
    assert_eq!(
        journal.events(),
        vec!["start:code", "start:git", "abort:git", "abort:code"]
    );
}

struct SlowModel;

#[async_trait::async_trait]
impl ModelProviderClient for SlowModel {
    fn model(&self) -> &str {
        "slow"
    }

    async fn complete(
        &self,
        _request: nextvuln::provider::CompletionRequest,
    ) -> Result<nextvuln::provider::CompletionResponse, ApiError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(answer("too late"))
    }
}

#[test]
fn builder_rejects_inconsistent_crews() {
    let model = ScriptedModel::echo();
    let no_tasks = Crew::builder("empty").agent(agent("a", model.clone())).build();
    assert!(no_tasks.is_err());

    let unknown_agent = Crew::builder("orphan")
        .agent(agent("a", model.clone()))
        .task(task("t", "b"))
        .build();
    assert!(unknown_agent.unwrap_err().to_string().contains("unknown agent 'b'"));

    let unknown_tool = Crew::builder("tools")
        .agent(agent("a", model.clone()).with_tools(["git"]))
        .task(task("t", "a"))
        .build();
    assert!(unknown_tool
        .unwrap_err()
        .to_string()
        .contains("unknown tool provider 'git'"));

    let duplicate = Crew::builder("dup")
        .agent(agent("a", model.clone()))
        .task(task("t", "a"))
        .task(task("t", "a"))
        .build();
    assert!(duplicate.unwrap_err().to_string().contains("duplicate task name 't'"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_number_of_tasks_runs_in_declaration_order(count in 1usize..8) {
        let model = ScriptedModel::echo();
        let mut builder = Crew::builder("prop").agent(agent("a", model.clone()));
        let names: Vec<String> = (0..count).map(|i| format!("task{}", i)).collect();
        for name in &names {
            builder = builder.task(task(name, "a"));
        }
        let mut crew = builder.build().unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let output = runtime.block_on(crew.kickoff(&HashMap::new())).unwrap();

        let ran: Vec<String> = output.tasks_output.iter().map(|t| t.task.clone()).collect();
        prop_assert_eq!(&ran, &names);
        let expected: Vec<String> = names.iter().map(|n| format!("work on {}", n)).collect();
        prop_assert_eq!(model.tasks_seen(), expected);
        let expected_raw = format!("done: work on {}", names[count - 1]);
        prop_assert_eq!(output.raw, expected_raw);
    }
}

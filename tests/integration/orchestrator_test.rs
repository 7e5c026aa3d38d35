//! End-to-end Run Tests
//!
//! Drives `Orchestrator::run` over a two-phase workflow built from shell
//! tools: enumeration feeds its merged host list into probing.

use std::path::Path;

use recon_core::CoreError;
use recon_orchestrator::config::ToolEntry;
use recon_orchestrator::{Orchestrator, OrchestratorConfig, RunOptions};
use recon_pipeline::checkpoint::CheckpointStore;
use recon_pipeline::hooks::{MERGE, MERGE_HOSTS};
use recon_pipeline::registry::PhaseDefinition;
use recon_pipeline::summary::{RunSummary, SUMMARY_FILE};
use recon_pipeline::ToolStatus;
use tempfile::TempDir;

use crate::common::{invocations, TARGET};

fn entry(command: impl Into<String>) -> ToolEntry {
    ToolEntry {
        command: command.into(),
        group: None,
        stage: None,
        timeout_secs: Some(10),
        binary: Some("sh".to_string()),
        critical: false,
    }
}

/// `enum` lists two hosts (one in upper case) twice over; `probe` turns the
/// merged list into URLs. Every tool also logs itself to `counter`.
fn config(counter: &Path) -> OrchestratorConfig {
    let log = |name: &str| format!("echo {} >> {}", name, counter.display());
    let mut config = OrchestratorConfig::default();
    config.tools.insert(
        "lister".to_string(),
        entry(format!(
            "{}; printf '%s\\n' www.{{target}} API.{{target}}",
            log("lister")
        )),
    );
    config.tools.insert(
        "lister2".to_string(),
        entry(format!(
            "{}; printf '%s\\n' api.{{target}} www.{{target}}",
            log("lister2")
        )),
    );
    config.tools.insert(
        "prober".to_string(),
        entry(format!("{}; sed 's|^|https://|' {{input}}", log("prober"))),
    );
    config.phases = Some(vec![
        PhaseDefinition::new("enum", &["lister", "lister2"]).with_hook(MERGE_HOSTS),
        PhaseDefinition::new("probe", &["prober"]).with_hook(MERGE),
    ]);
    config
}

fn options(out_dir: &Path) -> RunOptions {
    RunOptions::new(TARGET, out_dir)
}

#[tokio::test]
async fn test_full_run_chains_phase_outputs() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let counter = temp.path().join("counter");
    let orchestrator = Orchestrator::new(config(&counter));

    let outcome = orchestrator.run(&options(&out)).await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.reports.len(), 2);
    assert_eq!(outcome.checkpoint_failures, 0);
    assert_eq!(invocations(&counter), 3);

    let hosts = std::fs::read_to_string(out.join("enum").join("merged.txt")).unwrap();
    assert_eq!(
        hosts.lines().collect::<Vec<_>>(),
        vec!["www.example.com", "api.example.com"]
    );
    let urls = std::fs::read_to_string(out.join("probe").join("merged.txt")).unwrap();
    assert_eq!(
        urls.lines().collect::<Vec<_>>(),
        vec!["https://www.example.com", "https://api.example.com"]
    );

    let summary = RunSummary::read_json(&out.join(SUMMARY_FILE)).unwrap();
    assert_eq!(summary, outcome.summary);
    assert_eq!(summary.totals().ok, 3);
    assert!(summary.failed_tools.is_empty());

    let state = CheckpointStore::new(&out).load(TARGET).unwrap().unwrap();
    assert!(state.is_phase_complete("enum"));
    assert!(state.is_phase_complete("probe"));
    assert_eq!(state.completed_tools.len(), 3);
    assert!(state.abort_reason.is_none());
}

#[tokio::test]
async fn test_resume_skips_finished_work() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let counter = temp.path().join("counter");
    let orchestrator = Orchestrator::new(config(&counter));

    let first = orchestrator.run(&options(&out)).await.unwrap();
    assert_eq!(invocations(&counter), 3);

    let mut resume = options(&out);
    resume.resume = true;
    let second = orchestrator.run(&resume).await.unwrap();

    assert!(second.is_complete());
    assert_eq!(invocations(&counter), 3);
    assert_eq!(second.summary.run_id, first.summary.run_id);
}

#[tokio::test]
async fn test_resume_with_retry_failed_reruns_only_failures() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let counter = temp.path().join("counter");
    let flaky_counter = temp.path().join("flaky");
    let mut config = config(&counter);
    config.tools.insert(
        "flaky".to_string(),
        entry(format!("echo flaky >> {}; exit 1", flaky_counter.display())),
    );
    config.phases = Some(vec![
        PhaseDefinition::new("enum", &["lister", "flaky"]).with_hook(MERGE_HOSTS),
    ]);
    let orchestrator = Orchestrator::new(config);

    let first = orchestrator.run(&options(&out)).await.unwrap();
    assert!(first.is_complete());
    assert_eq!(first.summary.failed_tools.len(), 1);
    assert_eq!(first.summary.failed_tools[0].status, ToolStatus::Error);

    let mut resume = options(&out);
    resume.resume = true;
    orchestrator.run(&resume).await.unwrap();
    assert_eq!(invocations(&flaky_counter), 1);

    resume.retry_failed = true;
    orchestrator.run(&resume).await.unwrap();
    assert_eq!(invocations(&flaky_counter), 2);
    assert_eq!(invocations(&counter), 1);
}

#[tokio::test]
async fn test_critical_failure_stops_later_phases() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let counter = temp.path().join("counter");
    let mut config = config(&counter);
    let mut gate = entry("echo 'scope file unreadable' >&2; exit 3");
    gate.critical = true;
    config.tools.insert("gate".to_string(), gate);
    config.phases = Some(vec![
        PhaseDefinition::new("enum", &["gate"]),
        PhaseDefinition::new("probe", &["prober"]).with_hook(MERGE),
    ]);
    let orchestrator = Orchestrator::new(config);

    let outcome = orchestrator.run(&options(&out)).await.unwrap();

    assert!(matches!(
        outcome.stopped_by,
        Some(CoreError::CriticalTool { .. })
    ));
    assert!(outcome.summary.is_aborted());
    assert_eq!(invocations(&counter), 0);

    let state = CheckpointStore::new(&out).load(TARGET).unwrap().unwrap();
    assert!(state.abort_reason.as_deref().unwrap().contains("gate"));
    assert!(!state.is_phase_complete("enum"));
    assert!(state.phase_results("probe").is_none());
}

#[tokio::test]
async fn test_resume_reattempts_failed_critical_tool() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let counter = temp.path().join("counter");
    let scope = temp.path().join("scope.txt");
    let mut config = config(&counter);
    let mut gate = entry(format!(
        "test -f {s} || {{ echo down >&2; exit 3; }}; cat {s}",
        s = scope.display()
    ));
    gate.critical = true;
    config.tools.insert("gate".to_string(), gate);
    config.phases = Some(vec![
        PhaseDefinition::new("enum", &["gate"]).with_hook(MERGE_HOSTS),
        PhaseDefinition::new("probe", &["prober"]).with_hook(MERGE),
    ]);
    let orchestrator = Orchestrator::new(config);
    let mut resume = options(&out);
    resume.resume = true;

    orchestrator.run(&options(&out)).await.unwrap();
    let still_failing = orchestrator.run(&resume).await.unwrap();

    assert!(matches!(
        still_failing.stopped_by,
        Some(CoreError::CriticalTool { .. })
    ));
    assert!(still_failing.summary.is_aborted());
    assert_eq!(invocations(&counter), 0);

    std::fs::write(&scope, "www.example.com\n").unwrap();
    let recovered = orchestrator.run(&resume).await.unwrap();

    assert!(recovered.is_complete());
    assert!(!recovered.summary.is_aborted());
    assert_eq!(invocations(&counter), 1);
    let state = CheckpointStore::new(&out).load(TARGET).unwrap().unwrap();
    assert!(state.abort_reason.is_none());
    assert_eq!(state.result("enum", "gate").unwrap().status, ToolStatus::Ok);
    assert!(state.is_phase_complete("probe"));
}

#[tokio::test]
async fn test_fresh_run_ignores_artifacts_of_earlier_run() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let seed = temp.path().join("seed.txt");
    std::fs::write(&seed, "old.example.com\n").unwrap();
    let mut config = OrchestratorConfig::default();
    config.tools.insert(
        "finder".to_string(),
        entry(format!(
            "test -f {s} && cat {s} > {{output}}; true",
            s = seed.display()
        )),
    );
    config.phases = Some(vec![
        PhaseDefinition::new("enum", &["finder"]).with_hook(MERGE_HOSTS)
    ]);
    let orchestrator = Orchestrator::new(config);

    orchestrator.run(&options(&out)).await.unwrap();
    let merged = out.join("enum").join("merged.txt");
    assert_eq!(std::fs::read_to_string(&merged).unwrap(), "old.example.com\n");

    std::fs::remove_file(&seed).unwrap();
    let outcome = orchestrator.run(&options(&out)).await.unwrap();

    assert!(outcome.is_complete());
    let state = CheckpointStore::new(&out).load(TARGET).unwrap().unwrap();
    assert!(state.result("enum", "finder").unwrap().output_path.is_none());
    let merged = std::fs::read_to_string(&merged).unwrap_or_default();
    assert!(!merged.contains("old.example.com"));
}

#[tokio::test]
async fn test_target_is_trimmed_before_use() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let counter = temp.path().join("counter");
    let orchestrator = Orchestrator::new(config(&counter));

    let outcome = orchestrator
        .run(&RunOptions::new("  example.com \n", &out))
        .await
        .unwrap();

    assert_eq!(outcome.summary.target, TARGET);
    let state = CheckpointStore::new(&out).load(TARGET).unwrap().unwrap();
    assert_eq!(state.target, TARGET);
    let hosts = std::fs::read_to_string(out.join("enum").join("merged.txt")).unwrap();
    assert!(hosts.lines().all(|h| h.ends_with(".example.com")));
}

#[tokio::test]
async fn test_invalid_target_is_rejected_before_running() {
    let temp = TempDir::new().unwrap();
    let counter = temp.path().join("counter");
    let orchestrator = Orchestrator::new(config(&counter));

    let options = RunOptions::new("example.com; touch pwned", temp.path().join("out"));
    assert!(orchestrator.run(&options).await.is_err());
    assert_eq!(invocations(&counter), 0);
    assert!(!temp.path().join("out").exists());
}

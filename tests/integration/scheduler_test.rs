//! Phase Scheduler Integration Tests

use std::time::Instant;

use recon_pipeline::{ToolRunResult, ToolSpec, ToolStatus};
use tempfile::TempDir;

use crate::common::{context, counting_tool, invocations, phase, scheduler, state};

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_failed_tool_does_not_block_phase() {
    let temp = TempDir::new().unwrap();
    let tools = vec![
        ToolSpec::new("subfinder", "printf 'a.example.com\\n'").with_binary("printf"),
        ToolSpec::new("amass", "echo 'rate limited' >&2; exit 1").with_binary("sh"),
    ];
    let state = state(temp.path());

    let report = scheduler(tools, 5)
        .run_phase(&phase("enum", &["subfinder", "amass"]), &state, &context(temp.path()))
        .await
        .unwrap();

    assert!(report.completed);
    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.result("enum", "subfinder").unwrap().status, ToolStatus::Ok);

    let amass = snapshot.result("enum", "amass").unwrap();
    assert_eq!(amass.status, ToolStatus::Error);
    assert_eq!(amass.exit_code, Some(1));
    assert!(amass.error_message.as_deref().unwrap().contains("rate limited"));
    assert!(snapshot.is_phase_complete("enum"));
    assert!(snapshot.abort_reason.is_none());
}

#[tokio::test]
async fn test_missing_binary_among_many_tools() {
    let temp = TempDir::new().unwrap();
    let mut tools: Vec<ToolSpec> = (0..4)
        .map(|i| ToolSpec::new(format!("tool{}", i), format!("echo host{}.example.com", i)).with_binary("echo"))
        .collect();
    tools.push(ToolSpec::new("ghost", "ghost-recon-4242 -d {target}"));
    let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let state = state(temp.path());

    scheduler(tools, 3)
        .run_phase(&phase("enum", &name_refs), &state, &context(temp.path()))
        .await
        .unwrap();

    let snapshot = state.snapshot().await;
    let results = snapshot.phase_results("enum").unwrap();
    assert_eq!(results.len(), 5);
    assert_eq!(results["ghost"].status, ToolStatus::Missing);
    assert_eq!(
        results.values().filter(|r| r.status == ToolStatus::Ok).count(),
        4
    );
    assert!(snapshot.is_phase_complete("enum"));
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_resume_skips_recorded_tools() {
    let temp = TempDir::new().unwrap();
    let counter = temp.path().join("calls.log");
    let tools = vec![
        counting_tool("subfinder", &counter),
        counting_tool("assetfinder", &counter),
        counting_tool("amass", &counter),
    ];
    let state = state(temp.path());
    state
        .record(ToolRunResult::ok("enum", "subfinder", 0.1, None))
        .await;

    let report = scheduler(tools, 2)
        .run_phase(
            &phase("enum", &["subfinder", "assetfinder", "amass"]),
            &state,
            &context(temp.path()),
        )
        .await
        .unwrap();

    assert_eq!(report.skipped, vec!["subfinder"]);
    assert_eq!(invocations(&counter), 2);
    let calls = std::fs::read_to_string(&counter).unwrap();
    assert!(!calls.contains("subfinder"));
}

#[tokio::test]
async fn test_completed_phase_rerun_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let counter = temp.path().join("calls.log");
    let tools = vec![counting_tool("a", &counter), counting_tool("b", &counter)];
    let phase = phase("enum", &["a", "b"]).with_hook("merge");
    let state = state(temp.path());
    let scheduler = scheduler(tools, 2);

    scheduler.run_phase(&phase, &state, &context(temp.path())).await.unwrap();
    let before = state.snapshot().await;
    let calls_before = invocations(&counter);

    let report = scheduler.run_phase(&phase, &state, &context(temp.path())).await.unwrap();

    assert!(report.executed.is_empty());
    assert_eq!(invocations(&counter), calls_before);
    assert_eq!(state.snapshot().await, before);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrency_limit_bounds_parallelism() {
    let temp = TempDir::new().unwrap();
    let tools: Vec<ToolSpec> = (0..20)
        .map(|i| ToolSpec::new(format!("sleeper{:02}", i), "sleep 1"))
        .collect();
    let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let state = state(temp.path());

    let start = Instant::now();
    scheduler(tools, 5)
        .run_phase(&phase("sleep", &name_refs), &state, &context(temp.path()))
        .await
        .unwrap();
    let elapsed = start.elapsed().as_secs_f64();

    assert!(elapsed >= 4.0, "finished too fast: {:.2}s", elapsed);
    assert!(elapsed < 12.0, "ran serially: {:.2}s", elapsed);
    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.phase_results("sleep").unwrap().len(), 20);
    assert!(snapshot
        .phase_results("sleep")
        .unwrap()
        .values()
        .all(|r| r.status == ToolStatus::Ok));
}

//! Timeout Integration Tests
//!
//! A tool that outlives its timeout is classified `timeout`, its elapsed
//! time stays within the timeout plus the kill grace period, and nothing it
//! spawned survives.

use recon_pipeline::{ToolSpec, ToolStatus};
use tempfile::TempDir;

use crate::common::{context, phase, scheduler, state};

/// Grace period configured by `common::scheduler`.
const GRACE_SECS: f64 = 1.0;

#[tokio::test]
async fn test_timeout_classification_and_elapsed_bounds() {
    let temp = TempDir::new().unwrap();
    let tools = vec![ToolSpec::new("katana", "sleep 30").with_timeout(1)];
    let state = state(temp.path());

    scheduler(tools, 1)
        .run_phase(&phase("crawl", &["katana"]), &state, &context(temp.path()))
        .await
        .unwrap();

    let snapshot = state.snapshot().await;
    let result = snapshot.result("crawl", "katana").unwrap();
    assert_eq!(result.status, ToolStatus::Timeout);
    assert!(result.elapsed_seconds >= 1.0);
    assert!(result.elapsed_seconds <= 1.0 + GRACE_SECS + 0.5);
    assert!(result.error_message.as_deref().unwrap().contains("timed out"));
    assert!(snapshot.is_phase_complete("crawl"));
}

#[tokio::test]
async fn test_timeout_keeps_partial_output_artifact() {
    let temp = TempDir::new().unwrap();
    let tools = vec![ToolSpec::new("gau", "echo first.example.com; sleep 30")
        .with_binary("sh")
        .with_timeout(1)];
    let state = state(temp.path());

    scheduler(tools, 1)
        .run_phase(&phase("crawl", &["gau"]), &state, &context(temp.path()))
        .await
        .unwrap();

    let result = state.snapshot().await.result("crawl", "gau").cloned().unwrap();
    assert_eq!(result.status, ToolStatus::Timeout);
    let artifact = result.output_path.unwrap();
    assert_eq!(
        std::fs::read_to_string(artifact).unwrap().trim(),
        "first.example.com"
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_timeout_leaves_no_descendants() {
    let temp = TempDir::new().unwrap();
    let pid_file = temp.path().join("pids");
    let command = format!(
        "sh -c 'sleep 60' & echo $! >> {p}; sleep 60 & echo $! >> {p}; wait",
        p = pid_file.display()
    );
    let tools = vec![ToolSpec::new("naabu", command).with_binary("sh").with_timeout(1)];
    let state = state(temp.path());

    scheduler(tools, 1)
        .run_phase(&phase("probe", &["naabu"]), &state, &context(temp.path()))
        .await
        .unwrap();

    let pids: Vec<u32> = std::fs::read_to_string(&pid_file)
        .unwrap()
        .lines()
        .filter_map(|l| l.trim().parse().ok())
        .collect();
    assert_eq!(pids.len(), 2);

    for pid in pids {
        let mut alive = true;
        for _ in 0..20 {
            alive = is_running(pid);
            if !alive {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert!(!alive, "process {} outlived the timeout", pid);
    }
}

#[cfg(target_os = "linux")]
fn is_running(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map(|s| s != "Z" && s != "X")
        })
        .unwrap_or(false)
}

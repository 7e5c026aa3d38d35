//! Checkpoint Integration Tests

use std::path::PathBuf;

use recon_pipeline::checkpoint::CheckpointStore;
use recon_pipeline::{RunState, ScanDepth, ToolRunResult};
use tempfile::TempDir;

fn populated_state() -> RunState {
    let mut state = RunState::new("shop.example.com", ScanDepth::Deeper);
    state.record_result(ToolRunResult::ok(
        "subdomains",
        "subfinder",
        12.75,
        Some(PathBuf::from("/r/subdomains/subfinder.txt")),
    ));
    state.record_result(ToolRunResult::missing("subdomains", "findomain", "findomain"));
    state.record_result(ToolRunResult::undefined("subdomains", "sublist3r"));
    state.record_result(
        ToolRunResult::error(
            "probe",
            "httpx",
            Some(2),
            0.5,
            "line one\nline \"two\" with tab\tand unicode: 日本語 ✓ 🚀\n",
        )
        .with_attempt(3),
    );
    state.record_result(ToolRunResult::timeout("crawl", "katana", 901.2, 900));
    state.mark_phase_complete("subdomains");
    state.phase_outputs.insert(
        "subdomains".to_string(),
        PathBuf::from("/r/subdomains/merged.txt"),
    );
    state
        .phase_errors
        .insert("probe".to_string(), "Hook error: unknown hook 'x'".to_string());
    state.abort_reason = Some("Critical tool 'httpx' failed".to_string());
    state
}

#[test]
fn test_save_load_round_trip_preserves_every_field() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path());
    let state = populated_state();

    store.save(&state).unwrap();
    let loaded = store.load("shop.example.com").unwrap().unwrap();

    assert_eq!(loaded, state);
    assert_eq!(loaded.run_id, state.run_id);
    assert_eq!(loaded.result("probe", "httpx").unwrap().attempt, 3);
}

#[test]
fn test_state_file_location_and_format() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path());
    store.save(&populated_state()).unwrap();

    let path = temp.path().join(".state").join("shop.example.com.json");
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(raw["target"], "shop.example.com");
    assert_eq!(raw["scanDepth"], "deeper");
    assert_eq!(raw["toolResults"]["crawl"]["katana"]["status"], "timeout");
}

#[test]
fn test_targets_are_isolated() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path());
    store.save(&populated_state()).unwrap();
    store
        .save(&RunState::new("other.example.com", ScanDepth::Light))
        .unwrap();

    store.clear("other.example.com").unwrap();
    assert!(store.load("other.example.com").unwrap().is_none());
    assert!(store.load("shop.example.com").unwrap().is_some());
}

#[test]
fn test_wildcard_and_underscore_targets_do_not_share_a_file() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path());
    let wildcard = RunState::new("*.example.com", ScanDepth::Light);
    let underscore = RunState::new("_.example.com", ScanDepth::Deep);

    store.save(&wildcard).unwrap();
    store.save(&underscore).unwrap();

    assert_ne!(store.state_path("*.example.com"), store.state_path("_.example.com"));
    assert_eq!(store.load("*.example.com").unwrap().unwrap(), wildcard);
    assert_eq!(store.load("_.example.com").unwrap().unwrap(), underscore);
}

#[test]
fn test_measured_elapsed_times_round_trip_exactly() {
    let temp = TempDir::new().unwrap();
    let store = CheckpointStore::new(temp.path());
    let mut state = RunState::new("example.com", ScanDepth::Light);
    let mut secs = 0.0_f64;
    for i in 0..200 {
        // Values with full 17-digit precision, like Duration::as_secs_f64.
        secs += std::f64::consts::PI * 0.37 + (i as f64) / 7.0;
        state.record_result(ToolRunResult::ok("enum", &format!("tool{:03}", i), secs, None));
    }

    store.save(&state).unwrap();
    assert_eq!(store.load("example.com").unwrap().unwrap(), state);
}

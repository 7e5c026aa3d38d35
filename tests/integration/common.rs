//! Shared fixtures for the integration tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use recon_pipeline::checkpoint::{CheckpointStore, StateHandle};
use recon_pipeline::{
    Phase, PhaseContext, PhaseScheduler, RunState, ScanDepth, ShellRunner, ToolExecutor,
    ToolRegistry, ToolSpec,
};

pub const TARGET: &str = "example.com";

/// Scheduler over the given tools with a short kill grace period.
pub fn scheduler(tools: Vec<ToolSpec>, concurrency: usize) -> PhaseScheduler {
    let runner = ShellRunner::new().with_grace_period(Duration::from_secs(1));
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::from_specs(tools)), Arc::new(runner));
    PhaseScheduler::new(Arc::new(executor)).with_concurrency(concurrency)
}

/// File-backed state handle rooted at `out_dir`.
pub fn state(out_dir: &Path) -> StateHandle {
    StateHandle::new(
        RunState::new(TARGET, ScanDepth::Light),
        CheckpointStore::new(out_dir),
    )
}

pub fn context(out_dir: &Path) -> PhaseContext {
    PhaseContext {
        target: TARGET.to_string(),
        out_dir: out_dir.to_path_buf(),
        input: None,
    }
}

pub fn phase(name: &str, tools: &[&str]) -> Phase {
    Phase::new(name, tools.iter().map(|t| t.to_string()).collect())
}

/// Tool that appends a line to `counter` each time it runs.
pub fn counting_tool(name: &str, counter: &Path) -> ToolSpec {
    ToolSpec::new(name, format!("echo {} >> {}", name, counter.display())).with_binary("sh")
}

/// Number of times tools wrote to a counter file.
pub fn invocations(counter: &Path) -> usize {
    std::fs::read_to_string(counter)
        .map(|c| c.lines().count())
        .unwrap_or(0)
}

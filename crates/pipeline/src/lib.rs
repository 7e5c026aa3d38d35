//! Recon Pipeline
//!
//! Phased tool-execution engine for the recon orchestrator:
//!
//! - `models` - Registry entries, phases, per-attempt results and `RunState`
//! - `template` - Command template resolution and shell quoting
//! - `locator` - PATH lookup for required binaries
//! - `runner` - Subprocess execution with timeout and process-group kill
//! - `executor` - Per-tool policy (undefined/missing/error/timeout/ok, retries)
//! - `checkpoint` - Atomic JSON persistence and the shared state lock
//! - `aggregator` - Deduplicating merge of tool artifacts
//! - `hooks` - Phase post-process hook registry
//! - `scheduler` - Parallel-then-serial execution of one phase
//! - `registry` - Tool registry, workflow and depth filtering
//! - `summary` - End-of-run report

pub mod aggregator;
pub mod checkpoint;
pub mod executor;
pub mod hooks;
pub mod locator;
pub mod models;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod summary;
pub mod template;

// Re-export model types
pub use models::{
    Phase, RunState, ScanDepth, ToolGroup, ToolKey, ToolRunResult, ToolSpec, ToolStage,
    ToolStatus, DEFAULT_TIMEOUT_SECS,
};

// Re-export execution types
pub use executor::{ExecutionRequest, ExecutorConfig, RetryPolicy, ToolExecutor};
pub use runner::{ProcessOutput, ProcessRunner, ShellRunner};
pub use scheduler::{PhaseContext, PhaseReport, PhaseScheduler};

// Re-export persistence and aggregation
pub use aggregator::{Normalization, ResultAggregator};
pub use checkpoint::{CheckpointStore, StateHandle};
pub use hooks::{HookRegistry, PhaseHook};
pub use registry::{PhaseDefinition, ToolRegistry, Workflow};
pub use summary::RunSummary;
pub use template::{TemplateError, TemplateParams};

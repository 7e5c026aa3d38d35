//! Run Driver
//!
//! Builds the phase list for a scan depth, loads or creates the run state,
//! then runs the phases in order. Each phase consumes the merged output of
//! the latest earlier phase as `{input}`. Phase iteration stops only on a
//! critical tool failure or an interruption.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use recon_core::CoreError;
use recon_pipeline::checkpoint::{CheckpointStore, StateHandle};
use recon_pipeline::hooks::HookRegistry;
use recon_pipeline::locator::BinaryLocator;
use recon_pipeline::registry::{ToolRegistry, Workflow};
use recon_pipeline::scheduler::{PhaseContext, PhaseReport, PhaseScheduler};
use recon_pipeline::summary::RunSummary;
use recon_pipeline::{
    Phase, ProcessRunner, RunState, ScanDepth, ShellRunner, ToolExecutor, ToolGroup, ToolStage,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{ensure_dir, summary_path};

/// Options of one `run` invocation. `None` falls back to the config.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target: String,
    pub depth: ScanDepth,
    /// Explicit tool selection for `ScanDepth::Custom`
    pub tools: Vec<String>,
    pub resume: bool,
    pub retry_failed: bool,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub output_dir: PathBuf,
}

impl RunOptions {
    pub fn new(target: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            depth: ScanDepth::Light,
            tools: Vec::new(),
            resume: false,
            retry_failed: false,
            concurrency: None,
            timeout_secs: None,
            output_dir: output_dir.into(),
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub reports: Vec<PhaseReport>,
    /// Critical failure or interruption that stopped phase iteration
    pub stopped_by: Option<CoreError>,
    /// Checkpoint saves that failed during the run
    pub checkpoint_failures: usize,
}

impl RunOutcome {
    /// Every phase ran to completion.
    pub fn is_complete(&self) -> bool {
        self.stopped_by.is_none()
    }
}

/// One row of the tool inventory.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAvailability {
    pub name: String,
    pub group: ToolGroup,
    pub stage: ToolStage,
    pub timeout_secs: u64,
    pub critical: bool,
    pub binary: String,
    pub resolved_path: Option<PathBuf>,
}

/// Drives a whole recon run.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ToolRegistry>,
    workflow: Workflow,
    runner: Arc<dyn ProcessRunner>,
    locator: BinaryLocator,
    hooks: HookRegistry,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let registry = Arc::new(config.registry());
        let workflow = config.workflow();
        let runner = ShellRunner::new().with_grace_period(Duration::from_secs(config.defaults.grace_secs));
        Self {
            config,
            registry,
            workflow,
            runner: Arc::new(runner),
            locator: BinaryLocator::from_env(),
            hooks: HookRegistry::with_builtin(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the process runner
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the PATH lookup
    pub fn with_locator(mut self, locator: BinaryLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Share a cancellation token (Ctrl-C)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Phases a run with these options would execute.
    pub fn plan(&self, options: &RunOptions) -> AppResult<Vec<Phase>> {
        Ok(self
            .workflow
            .build(&self.registry, options.depth, &options.tools)?)
    }

    /// Execute a run. Startup problems are `Err`; a critical abort or an
    /// interruption is reported in `RunOutcome::stopped_by` after the state
    /// and summary are persisted.
    pub async fn run(&self, options: &RunOptions) -> AppResult<RunOutcome> {
        let options = &RunOptions {
            target: options.target.trim().to_string(),
            ..options.clone()
        };
        validate_target(&options.target)?;
        let phases = self.plan(options)?;
        ensure_dir(&options.output_dir)?;

        let store = CheckpointStore::new(&options.output_dir);
        let state = self.initial_state(&store, options)?;
        let state = StateHandle::new(state, store);
        // Persist right away so a crash before the first tool still leaves
        // a resumable checkpoint. A saved abort reason stays until the
        // aborted phase completes.
        state.update(|_| ()).await;

        let executor = ToolExecutor::new(self.registry.clone(), self.runner.clone())
            .with_config(self.config.executor_config(options.timeout_secs))
            .with_locator(self.locator.clone());
        let scheduler = PhaseScheduler::new(Arc::new(executor))
            .with_concurrency(options.concurrency.unwrap_or(self.config.defaults.concurrency))
            .with_retry_failed(options.retry_failed)
            .with_hooks(self.hooks.clone())
            .with_cancellation(self.cancel.clone());

        tracing::info!(
            target_domain = %options.target,
            depth = %options.depth,
            phases = phases.len(),
            concurrency = scheduler.concurrency(),
            resume = options.resume,
            "starting recon run"
        );

        let mut reports = Vec::new();
        let mut stopped_by = None;
        for (index, phase) in phases.iter().enumerate() {
            let input = state
                .read(|s| latest_phase_output(s, &phases[..index]))
                .await;
            let ctx = PhaseContext {
                target: options.target.clone(),
                out_dir: options.output_dir.clone(),
                input,
            };
            match scheduler.run_phase(phase, &state, &ctx).await {
                Ok(report) => reports.push(report),
                Err(e) if e.is_fatal() => {
                    tracing::error!(phase = %phase.name, error = %e, "run stopped");
                    stopped_by = Some(e);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let snapshot = state.snapshot().await;
        let phase_names: Vec<String> = phases.iter().map(|p| p.name.clone()).collect();
        let summary = RunSummary::from_state(&snapshot, &phase_names);
        let path = summary_path(&options.output_dir);
        if let Err(e) = summary.write_json(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write summary");
        }

        Ok(RunOutcome {
            summary,
            reports,
            stopped_by,
            checkpoint_failures: state.save_failures(),
        })
    }

    fn initial_state(&self, store: &CheckpointStore, options: &RunOptions) -> AppResult<RunState> {
        if options.resume {
            if let Some(state) = store.load(&options.target)? {
                if state.scan_depth != options.depth {
                    tracing::warn!(
                        saved = %state.scan_depth,
                        requested = %options.depth,
                        "resuming a run saved with a different depth"
                    );
                }
                tracing::info!(
                    run_id = %state.run_id,
                    completed_tools = state.completed_tools.len(),
                    completed_phases = state.completed_phases.len(),
                    "resuming from checkpoint"
                );
                return Ok(state);
            }
            tracing::info!("no checkpoint found, starting a fresh run");
        } else if store.state_path(&options.target).exists() {
            tracing::warn!(
                path = %store.state_path(&options.target).display(),
                "existing checkpoint will be replaced (use --resume to continue it)"
            );
        }
        Ok(RunState::new(options.target.as_str(), options.depth))
    }

    /// Registry entries with their PATH resolution.
    pub fn inventory(&self) -> Vec<ToolAvailability> {
        self.registry
            .iter()
            .map(|spec| ToolAvailability {
                name: spec.name.clone(),
                group: spec.group,
                stage: spec.stage,
                timeout_secs: spec.effective_timeout(self.config.defaults.timeout_secs),
                critical: spec.critical,
                binary: spec.required_binary.clone(),
                resolved_path: self.locator.find(&spec.required_binary),
            })
            .collect()
    }

    /// Summary rebuilt from the checkpoint of a target, if one exists.
    pub fn summary(&self, output_dir: &Path, target: &str) -> AppResult<Option<RunSummary>> {
        let store = CheckpointStore::new(output_dir);
        Ok(store
            .load(target)?
            .map(|state| RunSummary::from_state(&state, &self.workflow.phase_names())))
    }
}

/// Delete the checkpoint of a target. Returns whether one existed.
pub fn clear_state(output_dir: &Path, target: &str) -> AppResult<bool> {
    Ok(CheckpointStore::new(output_dir).clear(target)?)
}

/// Merged output of the latest phase in `earlier` that produced one.
fn latest_phase_output(state: &RunState, earlier: &[Phase]) -> Option<PathBuf> {
    earlier
        .iter()
        .rev()
        .find_map(|phase| state.phase_outputs.get(&phase.name).cloned())
}

/// Accept hostname characters only: letters, digits, `-`, `.`, `_`, `*`.
pub fn validate_target(target: &str) -> AppResult<()> {
    let target = target.trim();
    if target.is_empty() {
        return Err(AppError::validation("target must not be empty"));
    }
    if let Some(bad) = target
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '*')))
    {
        return Err(AppError::validation(format!(
            "target '{}' contains invalid character '{}'",
            target, bad
        )));
    }
    Ok(())
}

//! Phase Scheduler
//!
//! Runs the tools of one phase:
//! 1. Parallel group - a fixed pool of workers pulling tool names from a
//!    shared queue, at most `concurrency` subprocesses in flight
//! 2. Serial group - one tool at a time, in listed order
//! 3. Post-process hook, then the phase is marked complete
//!
//! Tools already recorded for the phase are skipped. A tool failure is
//! recorded and the phase carries on; only a tool flagged critical stops it.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use recon_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::StateHandle;
use crate::executor::{ExecutionRequest, ToolExecutor};
use crate::hooks::{HookContext, HookRegistry};
use crate::models::{Phase, RunState, ToolGroup, ToolRunResult};

/// Default size of the parallel worker pool.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// File name of a phase's merged candidates.
pub const MERGED_FILE: &str = "merged.txt";

/// Per-run inputs shared by every phase.
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub target: String,
    pub out_dir: PathBuf,
    /// Merged output of the latest earlier phase, for `{input}`
    pub input: Option<PathBuf>,
}

/// What one `run_phase` call did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: String,
    /// Tools that produced a result in this call
    pub executed: Vec<String>,
    /// Tools skipped because they were already recorded
    pub skipped: Vec<String>,
    pub merged_output: Option<PathBuf>,
    pub hook_error: Option<String>,
    pub completed: bool,
    pub duration_ms: u64,
}

/// Runs phases against a shared run state.
pub struct PhaseScheduler {
    executor: Arc<ToolExecutor>,
    hooks: Arc<HookRegistry>,
    concurrency: usize,
    retry_failed: bool,
    cancel: CancellationToken,
}

impl PhaseScheduler {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self {
            executor,
            hooks: Arc::new(HookRegistry::with_builtin()),
            concurrency: DEFAULT_CONCURRENCY,
            retry_failed: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the worker pool size (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Re-attempt tools whose recorded status is not ok
    pub fn with_retry_failed(mut self, retry_failed: bool) -> Self {
        self.retry_failed = retry_failed;
        self
    }

    /// Set hook registry
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Share an external cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// A recorded tool is re-run when it failed and either retry-failed is
    /// on or the tool is critical: a failed critical tool must not be
    /// resumed past.
    fn needs_run(&self, state: &RunState, phase: &str, tool: &str) -> bool {
        match state.result(phase, tool) {
            _ if !state.is_tool_complete(phase, tool) => true,
            Some(result) if !result.status.is_ok() => {
                self.retry_failed || self.executor.registry().is_critical(tool)
            }
            _ => false,
        }
    }

    /// Run one phase to completion.
    ///
    /// Idempotent: a completed phase with nothing left to run returns
    /// without touching the state. Returns `CoreError::CriticalTool` after
    /// persisting the abort reason, or `CoreError::Cancelled` when
    /// interrupted; in both cases the phase is left incomplete.
    pub async fn run_phase(
        &self,
        phase: &Phase,
        state: &StateHandle,
        ctx: &PhaseContext,
    ) -> CoreResult<PhaseReport> {
        let start = Instant::now();
        let (pending, skipped, already_complete) = state
            .read(|s| {
                let (pending, skipped): (Vec<String>, Vec<String>) = phase
                    .tool_names
                    .iter()
                    .cloned()
                    .partition(|tool| self.needs_run(s, &phase.name, tool));
                (pending, skipped, s.is_phase_complete(&phase.name))
            })
            .await;

        let mut report = PhaseReport {
            phase: phase.name.clone(),
            skipped,
            ..PhaseReport::default()
        };

        if already_complete && pending.is_empty() {
            tracing::info!(phase = %phase.name, "phase already complete, skipping");
            report.completed = true;
            return Ok(report);
        }

        tracing::info!(
            phase = %phase.name,
            pending = pending.len(),
            skipped = report.skipped.len(),
            "phase started"
        );

        let registry = self.executor.registry();
        let (parallel, serial): (Vec<String>, Vec<String>) = pending
            .into_iter()
            .partition(|tool| registry.group_of(tool) == ToolGroup::Parallel);

        let halt = self.cancel.child_token();
        let critical: Arc<Mutex<Option<ToolRunResult>>> = Arc::new(Mutex::new(None));

        report.executed = self
            .run_parallel(&phase.name, parallel, state, ctx, &halt, &critical)
            .await?;

        for tool in serial {
            if halt.is_cancelled() {
                break;
            }
            let request = request_for(&phase.name, &tool, ctx);
            if let Some(result) = self.executor.execute(&request, state, &self.cancel).await {
                report.executed.push(tool);
                if self.is_critical_failure(&result) {
                    store_critical(&critical, result);
                    halt.cancel();
                }
            }
        }

        if let Some(failure) = take_critical(&critical) {
            return Err(self.abort(state, failure).await);
        }
        if self.cancel.is_cancelled() {
            tracing::warn!(phase = %phase.name, "phase interrupted");
            return Err(CoreError::Cancelled);
        }

        self.finish_phase(phase, state, ctx, &mut report).await;
        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            phase = %phase.name,
            executed = report.executed.len(),
            duration_ms = report.duration_ms,
            "phase complete"
        );
        Ok(report)
    }

    async fn run_parallel(
        &self,
        phase: &str,
        tools: Vec<String>,
        state: &StateHandle,
        ctx: &PhaseContext,
        halt: &CancellationToken,
        critical: &Arc<Mutex<Option<ToolRunResult>>>,
    ) -> CoreResult<Vec<String>> {
        if tools.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.concurrency.min(tools.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(tools)));
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let queue = queue.clone();
            let executor = self.executor.clone();
            let state = state.clone();
            let halt = halt.clone();
            let cancel = self.cancel.clone();
            let critical = critical.clone();
            let phase = phase.to_string();
            let ctx = ctx.clone();

            handles.push(tokio::spawn(async move {
                let mut executed = Vec::new();
                loop {
                    if halt.is_cancelled() {
                        break;
                    }
                    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some(tool) = next else {
                        break;
                    };

                    let request = request_for(&phase, &tool, &ctx);
                    let Some(result) = executor.execute(&request, &state, &cancel).await else {
                        continue;
                    };
                    executed.push(tool);
                    if !result.status.is_ok() && executor.registry().is_critical(&result.tool_name) {
                        store_critical(&critical, result);
                        halt.cancel();
                    }
                }
                executed
            }));
        }

        let mut executed = Vec::new();
        for joined in futures_util::future::join_all(handles).await {
            let tools = joined.map_err(|e| CoreError::internal(format!("worker task failed: {}", e)))?;
            executed.extend(tools);
        }
        Ok(executed)
    }

    fn is_critical_failure(&self, result: &ToolRunResult) -> bool {
        !result.status.is_ok() && self.executor.registry().is_critical(&result.tool_name)
    }

    async fn abort(&self, state: &StateHandle, failure: ToolRunResult) -> CoreError {
        let message = failure
            .error_message
            .clone()
            .unwrap_or_else(|| failure.status.to_string());
        let error = CoreError::critical_tool(&failure.phase_name, &failure.tool_name, message);
        let reason = error.to_string();
        tracing::error!(
            phase = %failure.phase_name,
            tool = %failure.tool_name,
            status = %failure.status,
            "critical tool failed, aborting run"
        );
        state.update(|s| s.abort_reason = Some(reason)).await;
        error
    }

    /// Run the hook (if any) and mark the phase complete.
    async fn finish_phase(
        &self,
        phase: &Phase,
        state: &StateHandle,
        ctx: &PhaseContext,
        report: &mut PhaseReport,
    ) {
        let hook_outcome = match &phase.post_process_hook {
            Some(hook_id) => {
                let artifacts = state
                    .read(|s| {
                        phase
                            .tool_names
                            .iter()
                            .filter_map(|tool| s.result(&phase.name, tool))
                            .filter_map(|result| result.output_path.clone())
                            .collect::<Vec<_>>()
                    })
                    .await;
                let hook_ctx = HookContext {
                    phase: phase.name.clone(),
                    artifacts,
                    destination: ctx.out_dir.join(&phase.name).join(MERGED_FILE),
                };
                let hooks = self.hooks.clone();
                let id = hook_id.clone();
                // Hooks do blocking file IO.
                let outcome = tokio::task::spawn_blocking(move || hooks.run(&id, &hook_ctx))
                    .await
                    .unwrap_or_else(|e| Err(CoreError::internal(format!("hook task failed: {}", e))));
                match &outcome {
                    Ok(output) => tracing::info!(
                        phase = %phase.name,
                        hook = %hook_id,
                        candidates = output.candidates,
                        "phase hook finished"
                    ),
                    Err(e) => tracing::warn!(
                        phase = %phase.name,
                        hook = %hook_id,
                        error = %e,
                        "phase hook failed"
                    ),
                }
                Some(outcome)
            }
            None => None,
        };

        match &hook_outcome {
            Some(Ok(output)) => report.merged_output = output.merged_path.clone(),
            Some(Err(e)) => report.hook_error = Some(e.to_string()),
            None => {}
        }

        let name = phase.name.clone();
        let merged = report.merged_output.clone();
        let hook_error = report.hook_error.clone();
        state
            .update(move |s| {
                if let Some(path) = merged {
                    s.phase_outputs.insert(name.clone(), path);
                }
                match hook_error {
                    Some(error) => {
                        s.phase_errors.insert(name.clone(), error);
                    }
                    None => {
                        s.phase_errors.remove(&name);
                    }
                }
                s.mark_phase_complete(&name);
                // The phase that aborted the run has now passed.
                s.abort_reason = None;
            })
            .await;
        report.completed = true;
    }
}

fn request_for(phase: &str, tool: &str, ctx: &PhaseContext) -> ExecutionRequest {
    ExecutionRequest {
        phase: phase.to_string(),
        tool: tool.to_string(),
        target: ctx.target.clone(),
        out_dir: ctx.out_dir.clone(),
        input: ctx.input.clone(),
    }
}

fn store_critical(slot: &Mutex<Option<ToolRunResult>>, result: ToolRunResult) {
    if let Ok(mut slot) = slot.lock() {
        slot.get_or_insert(result);
    }
}

fn take_critical(slot: &Mutex<Option<ToolRunResult>>) -> Option<ToolRunResult> {
    slot.lock().ok().and_then(|mut slot| slot.take())
}

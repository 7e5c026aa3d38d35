//! Tool Executor
//!
//! Wraps the process runner with per-tool policy:
//!
//! - Tool name not in the registry -> `undefined`, nothing spawned
//! - Required binary not on PATH -> `missing`, nothing spawned
//! - Template cannot be resolved or the OS refuses the spawn -> `error`
//! - Deadline hit -> `timeout`; non-zero exit -> `error` (stderr, truncated)
//! - Otherwise -> `ok`
//!
//! Every finished attempt is recorded into the run state and logged exactly
//! once. An attempt stopped by cancellation is not recorded, so a resumed
//! run picks the tool up again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::checkpoint::StateHandle;
use crate::locator::BinaryLocator;
use crate::models::{ToolRunResult, ToolSpec, ToolStatus, DEFAULT_TIMEOUT_SECS};
use crate::registry::ToolRegistry;
use crate::runner::{ProcessOutput, ProcessRunner};
use crate::template::{self, TemplateParams};

/// Default cap on the stderr kept in an error message.
pub const DEFAULT_MAX_ERROR_BYTES: usize = 4096;

// ============================================================================
// Configuration
// ============================================================================

/// Retry policy applied to `error` and `timeout` outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub backoff_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_secs: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_secs(self.backoff_secs.saturating_mul(factor))
    }
}

/// Executor-wide settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout for tools that do not set one
    pub default_timeout_secs: u64,
    /// Value substituted for `{threads}`
    pub threads: usize,
    /// Stderr bytes kept in an error message
    pub max_error_bytes: usize,
    pub retry: RetryPolicy,
    /// Extra template values shared by every tool
    pub params: TemplateParams,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            threads: 10,
            max_error_bytes: DEFAULT_MAX_ERROR_BYTES,
            retry: RetryPolicy::default(),
            params: TemplateParams::new(),
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Everything needed to run one tool of one phase.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub phase: String,
    pub tool: String,
    pub target: String,
    pub out_dir: PathBuf,
    /// Merged candidates of the previous phase
    pub input: Option<PathBuf>,
}

impl ExecutionRequest {
    /// Artifact path `{out_dir}/{phase}/{tool}.txt`.
    pub fn artifact_path(&self) -> PathBuf {
        artifact_path(&self.out_dir, &self.phase, &self.tool)
    }
}

/// Per-tool raw output location.
pub fn artifact_path(out_dir: &Path, phase: &str, tool: &str) -> PathBuf {
    out_dir.join(phase).join(format!("{}.txt", tool))
}

enum Attempt {
    Finished(ToolRunResult),
    Interrupted,
}

/// Runs registry tools and records their outcomes.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    runner: Arc<dyn ProcessRunner>,
    locator: BinaryLocator,
    config: ExecutorConfig,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            registry,
            runner,
            locator: BinaryLocator::from_env(),
            config: ExecutorConfig::default(),
        }
    }

    /// Set configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the PATH lookup
    pub fn with_locator(mut self, locator: BinaryLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a tool under the retry policy, recording every finished
    /// attempt into `state`.
    ///
    /// Returns the last recorded result, or `None` when the first attempt
    /// was interrupted before it finished.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        state: &StateHandle,
        cancel: &CancellationToken,
    ) -> Option<ToolRunResult> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut last = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                break;
            }
            let result = match self.attempt(request, cancel).await {
                Attempt::Finished(result) => result.with_attempt(attempt),
                Attempt::Interrupted => {
                    tracing::warn!(
                        phase = %request.phase,
                        tool = %request.tool,
                        "tool interrupted, attempt not recorded"
                    );
                    break;
                }
            };

            log_result(&result);
            state.record(result.clone()).await;

            let retry = result.status.is_retryable() && attempt < max_attempts;
            last = Some(result);
            if !retry {
                break;
            }

            let delay = self.config.retry.delay_after(attempt);
            tracing::info!(
                phase = %request.phase,
                tool = %request.tool,
                attempt,
                delay_secs = delay.as_secs(),
                "retrying tool"
            );
            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        last
    }

    /// One attempt, classified. Never records.
    async fn attempt(&self, request: &ExecutionRequest, cancel: &CancellationToken) -> Attempt {
        let phase = request.phase.as_str();
        let tool_name = request.tool.as_str();

        let Some(tool) = self.registry.get(tool_name) else {
            return Attempt::Finished(ToolRunResult::undefined(phase, tool_name));
        };

        if !self.locator.exists(&tool.required_binary) {
            return Attempt::Finished(ToolRunResult::missing(phase, tool_name, &tool.required_binary));
        }

        let artifact = request.artifact_path();
        if let Some(parent) = artifact.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return Attempt::Finished(ToolRunResult::error(
                    phase,
                    tool_name,
                    None,
                    0.0,
                    format!("cannot create artifact directory {}: {}", parent.display(), e),
                ));
            }
        }
        // Only files written by this attempt may become its output.
        if let Err(e) = remove_stale_artifact(&artifact) {
            return Attempt::Finished(ToolRunResult::error(
                phase,
                tool_name,
                None,
                0.0,
                format!("cannot remove stale artifact {}: {}", artifact.display(), e),
            ));
        }

        let command = match template::resolve(
            tool,
            &request.target,
            &request.out_dir,
            &self.template_params(request, &artifact),
        ) {
            Ok(command) => command,
            Err(e) => {
                return Attempt::Finished(ToolRunResult::error(
                    phase,
                    tool_name,
                    None,
                    0.0,
                    format!("template error: {}", e),
                ))
            }
        };

        let timeout_secs = tool.effective_timeout(self.config.default_timeout_secs);
        tracing::debug!(phase, tool = tool_name, %command, timeout_secs, "starting tool");

        let start = Instant::now();
        let output = match self.runner.run(&command, timeout_secs, cancel).await {
            Ok(output) => output,
            Err(e) => {
                return Attempt::Finished(ToolRunResult::error(
                    phase,
                    tool_name,
                    None,
                    start.elapsed().as_secs_f64(),
                    e.to_string(),
                ))
            }
        };

        if output.cancelled {
            return Attempt::Interrupted;
        }

        let output_path = self.persist_artifact(tool, &artifact, &output);
        Attempt::Finished(self.classify(phase, tool, timeout_secs, output, output_path))
    }

    fn template_params(&self, request: &ExecutionRequest, artifact: &Path) -> TemplateParams {
        let mut params = self.config.params.clone();
        params.insert(template::THREADS.to_string(), self.config.threads.to_string());
        params.insert(
            template::OUTPUT.to_string(),
            artifact.to_string_lossy().into_owned(),
        );
        if let Some(input) = &request.input {
            params.insert(template::INPUT.to_string(), input.to_string_lossy().into_owned());
        }
        params
    }

    /// Write captured stdout to the artifact unless the tool writes
    /// `{output}` itself. Returns the artifact path when it exists.
    fn persist_artifact(
        &self,
        tool: &ToolSpec,
        artifact: &Path,
        output: &ProcessOutput,
    ) -> Option<PathBuf> {
        if !template::references(&tool.command_template, template::OUTPUT) {
            if let Err(e) = std::fs::write(artifact, &output.stdout) {
                tracing::warn!(
                    tool = %tool.name,
                    path = %artifact.display(),
                    error = %e,
                    "failed to write tool output"
                );
            }
        }
        artifact.exists().then(|| artifact.to_path_buf())
    }

    fn classify(
        &self,
        phase: &str,
        tool: &ToolSpec,
        timeout_secs: u64,
        output: ProcessOutput,
        output_path: Option<PathBuf>,
    ) -> ToolRunResult {
        if output.timed_out {
            let mut result =
                ToolRunResult::timeout(phase, &tool.name, output.elapsed_seconds, timeout_secs);
            result.output_path = output_path;
            return result;
        }

        if output.exit_code == Some(0) {
            return ToolRunResult::ok(phase, &tool.name, output.elapsed_seconds, output_path);
        }

        let stderr = output.stderr.trim();
        let message = if !stderr.is_empty() {
            truncate_message(stderr, self.config.max_error_bytes)
        } else if let Some(signal) = output.signal {
            format!("terminated by signal {}", signal)
        } else {
            format!("exited with code {}", output.exit_code.unwrap_or(-1))
        };

        let mut result = ToolRunResult::error(
            phase,
            &tool.name,
            output.exit_code,
            output.elapsed_seconds,
            message,
        );
        result.output_path = output_path;
        result
    }
}

fn remove_stale_artifact(artifact: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(artifact) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Truncate to at most `max_bytes` on a char boundary.
pub fn truncate_message(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &message[..end])
}

fn log_result(result: &ToolRunResult) {
    match result.status {
        ToolStatus::Ok => tracing::info!(
            phase = %result.phase_name,
            tool = %result.tool_name,
            elapsed_secs = format!("{:.2}", result.elapsed_seconds),
            attempt = result.attempt,
            "tool finished ok"
        ),
        status => tracing::warn!(
            phase = %result.phase_name,
            tool = %result.tool_name,
            %status,
            exit_code = ?result.exit_code,
            elapsed_secs = format!("{:.2}", result.elapsed_seconds),
            attempt = result.attempt,
            error = result.error_message.as_deref().unwrap_or_default(),
            "tool did not finish ok"
        ),
    }
}

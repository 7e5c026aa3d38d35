//! Orchestrator Models
//!
//! Data structures shared by every stage of the recon pipeline: the static
//! tool registry entries, phases, per-attempt results and the resumable
//! run snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;

use recon_core::CoreError;
use serde::{Deserialize, Serialize};

/// Default subprocess timeout when neither the tool nor the config sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Enums
// ============================================================================

/// Execution group of a tool inside its phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    /// Runs in the bounded worker pool
    #[default]
    Parallel,
    /// Runs one at a time, in listed order, after the parallel group drains
    Serial,
}

impl std::fmt::Display for ToolGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolGroup::Parallel => write!(f, "parallel"),
            ToolGroup::Serial => write!(f, "serial"),
        }
    }
}

/// Operator-selected scan depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanDepth {
    #[default]
    Light,
    Deep,
    Deeper,
    /// Explicit tool selection; stages are ignored
    Custom,
}

impl ScanDepth {
    fn rank(self) -> u8 {
        match self {
            ScanDepth::Light => 1,
            ScanDepth::Deep => 2,
            ScanDepth::Deeper | ScanDepth::Custom => 3,
        }
    }
}

impl std::fmt::Display for ScanDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanDepth::Light => write!(f, "light"),
            ScanDepth::Deep => write!(f, "deep"),
            ScanDepth::Deeper => write!(f, "deeper"),
            ScanDepth::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for ScanDepth {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(ScanDepth::Light),
            "deep" => Ok(ScanDepth::Deep),
            "deeper" => Ok(ScanDepth::Deeper),
            "custom" => Ok(ScanDepth::Custom),
            other => Err(CoreError::config(format!("unknown scan depth '{}'", other))),
        }
    }
}

/// Minimum scan depth a tool requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStage {
    Light,
    Deep,
    Deeper,
    #[default]
    Any,
}

impl ToolStage {
    /// Whether a tool with this stage runs at the given depth.
    pub fn allows(self, depth: ScanDepth) -> bool {
        let required = match self {
            ToolStage::Any | ToolStage::Light => return true,
            ToolStage::Deep => ScanDepth::Deep,
            ToolStage::Deeper => ScanDepth::Deeper,
        };
        depth.rank() >= required.rank()
    }
}

impl std::fmt::Display for ToolStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStage::Light => write!(f, "light"),
            ToolStage::Deep => write!(f, "deep"),
            ToolStage::Deeper => write!(f, "deeper"),
            ToolStage::Any => write!(f, "any"),
        }
    }
}

/// Outcome classification of one tool attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Exited with code 0
    Ok,
    /// Required binary not found on PATH
    Missing,
    /// Tool name not present in the registry
    Undefined,
    /// Non-zero exit or unresolvable command
    Error,
    /// Killed after exceeding its timeout
    Timeout,
}

impl ToolStatus {
    /// All statuses in summary column order.
    pub const ALL: [ToolStatus; 5] = [
        ToolStatus::Ok,
        ToolStatus::Missing,
        ToolStatus::Error,
        ToolStatus::Timeout,
        ToolStatus::Undefined,
    ];

    /// Check if this status indicates success
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolStatus::Ok)
    }

    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolStatus::Error | ToolStatus::Timeout)
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolStatus::Ok => write!(f, "ok"),
            ToolStatus::Missing => write!(f, "missing"),
            ToolStatus::Undefined => write!(f, "undefined"),
            ToolStatus::Error => write!(f, "error"),
            ToolStatus::Timeout => write!(f, "timeout"),
        }
    }
}

// ============================================================================
// Tool Spec
// ============================================================================

/// A static registry entry describing one external tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    /// Unique registry key
    pub name: String,
    /// Shell command with `{placeholder}` slots
    pub command_template: String,
    /// Parallel or serial execution
    pub group: ToolGroup,
    /// Minimum scan depth
    pub stage: ToolStage,
    /// Per-tool timeout; falls back to the global default when unset
    pub timeout_secs: Option<u64>,
    /// Executable checked on PATH before running
    pub required_binary: String,
    /// Failure aborts the whole run
    pub critical: bool,
}

impl ToolSpec {
    /// Create a new tool spec. The required binary defaults to the first
    /// word of the command template.
    pub fn new(name: impl Into<String>, command_template: impl Into<String>) -> Self {
        let command_template = command_template.into();
        let required_binary = command_template
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            name: name.into(),
            command_template,
            group: ToolGroup::Parallel,
            stage: ToolStage::Any,
            timeout_secs: None,
            required_binary,
            critical: false,
        }
    }

    /// Set execution group
    pub fn with_group(mut self, group: ToolGroup) -> Self {
        self.group = group;
        self
    }

    /// Set minimum stage
    pub fn with_stage(mut self, stage: ToolStage) -> Self {
        self.stage = stage;
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Override the binary checked on PATH
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.required_binary = binary.into();
        self
    }

    /// Set critical flag
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Timeout to enforce, given the global default.
    pub fn effective_timeout(&self, default_secs: u64) -> u64 {
        self.timeout_secs.filter(|t| *t > 0).unwrap_or(default_secs)
    }
}

// ============================================================================
// Phase
// ============================================================================

/// An ordered, named stage of the recon workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    /// Phase name, also used as the artifact sub-directory
    pub name: String,
    /// Tool names; order matters only for serial members
    pub tool_names: Vec<String>,
    /// Hook identifier run after every tool has a result
    pub post_process_hook: Option<String>,
}

impl Phase {
    /// Create a phase without a hook
    pub fn new(name: impl Into<String>, tool_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tool_names,
            post_process_hook: None,
        }
    }

    /// Attach a post-process hook identifier
    pub fn with_hook(mut self, hook: impl Into<String>) -> Self {
        self.post_process_hook = Some(hook.into());
        self
    }
}

// ============================================================================
// Tool Run Result
// ============================================================================

/// Identity of one tool inside one phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolKey {
    pub phase: String,
    pub tool: String,
}

impl ToolKey {
    pub fn new(phase: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            tool: tool.into(),
        }
    }
}

impl std::fmt::Display for ToolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.phase, self.tool)
    }
}

/// Result of one (phase, tool) execution attempt.
///
/// `error_message` is present exactly when `status` is not `Ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRunResult {
    pub tool_name: String,
    pub phase_name: String,
    pub status: ToolStatus,
    pub exit_code: Option<i32>,
    pub elapsed_seconds: f64,
    /// Line-oriented artifact produced by the tool, when one exists
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
    /// 1-based attempt counter under the retry policy
    pub attempt: u32,
}

impl ToolRunResult {
    fn base(phase: &str, tool: &str, status: ToolStatus) -> Self {
        Self {
            tool_name: tool.to_string(),
            phase_name: phase.to_string(),
            status,
            exit_code: None,
            elapsed_seconds: 0.0,
            output_path: None,
            error_message: None,
            attempt: 1,
        }
    }

    /// Create a result for a tool that exited with code 0
    pub fn ok(phase: &str, tool: &str, elapsed_seconds: f64, output_path: Option<PathBuf>) -> Self {
        Self {
            exit_code: Some(0),
            elapsed_seconds,
            output_path,
            ..Self::base(phase, tool, ToolStatus::Ok)
        }
    }

    /// Create a result for a tool whose binary is not on PATH
    pub fn missing(phase: &str, tool: &str, binary: &str) -> Self {
        Self {
            error_message: Some(format!("binary '{}' not found on PATH", binary)),
            ..Self::base(phase, tool, ToolStatus::Missing)
        }
    }

    /// Create a result for a tool name absent from the registry
    pub fn undefined(phase: &str, tool: &str) -> Self {
        Self {
            error_message: Some(format!("tool '{}' is not defined in the registry", tool)),
            ..Self::base(phase, tool, ToolStatus::Undefined)
        }
    }

    /// Create a result for a failed attempt
    pub fn error(
        phase: &str,
        tool: &str,
        exit_code: Option<i32>,
        elapsed_seconds: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            exit_code,
            elapsed_seconds,
            error_message: Some(message.into()),
            ..Self::base(phase, tool, ToolStatus::Error)
        }
    }

    /// Create a result for an attempt killed at its deadline
    pub fn timeout(phase: &str, tool: &str, elapsed_seconds: f64, timeout_secs: u64) -> Self {
        Self {
            elapsed_seconds,
            error_message: Some(format!("timed out after {}s", timeout_secs)),
            ..Self::base(phase, tool, ToolStatus::Timeout)
        }
    }

    /// Set the attempt counter
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn key(&self) -> ToolKey {
        ToolKey::new(&self.phase_name, &self.tool_name)
    }
}

// ============================================================================
// Run State
// ============================================================================

/// Resumable snapshot of a run, persisted by the checkpoint store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub run_id: String,
    pub target: String,
    pub scan_depth: ScanDepth,
    pub completed_phases: BTreeSet<String>,
    pub completed_tools: BTreeSet<ToolKey>,
    /// phase -> tool -> latest result
    pub tool_results: BTreeMap<String, BTreeMap<String, ToolRunResult>>,
    /// phase -> merged candidate file
    #[serde(default)]
    pub phase_outputs: BTreeMap<String, PathBuf>,
    /// phase -> recorded (non-fatal) hook failure
    #[serde(default)]
    pub phase_errors: BTreeMap<String, String>,
    #[serde(default)]
    pub abort_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl RunState {
    /// Create an empty state for a fresh run
    pub fn new(target: impl Into<String>, scan_depth: ScanDepth) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            scan_depth,
            completed_phases: BTreeSet::new(),
            completed_tools: BTreeSet::new(),
            tool_results: BTreeMap::new(),
            phase_outputs: BTreeMap::new(),
            phase_errors: BTreeMap::new(),
            abort_reason: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Record an attempt: the latest result wins and the pair is marked
    /// complete. Completed pairs are never removed.
    pub fn record_result(&mut self, result: ToolRunResult) {
        self.completed_tools.insert(result.key());
        self.tool_results
            .entry(result.phase_name.clone())
            .or_default()
            .insert(result.tool_name.clone(), result);
    }

    pub fn is_tool_complete(&self, phase: &str, tool: &str) -> bool {
        self.completed_tools.contains(&ToolKey::new(phase, tool))
    }

    pub fn result(&self, phase: &str, tool: &str) -> Option<&ToolRunResult> {
        self.tool_results.get(phase).and_then(|tools| tools.get(tool))
    }

    /// Results of one phase, keyed by tool name.
    pub fn phase_results(&self, phase: &str) -> Option<&BTreeMap<String, ToolRunResult>> {
        self.tool_results.get(phase)
    }

    pub fn is_phase_complete(&self, phase: &str) -> bool {
        self.completed_phases.contains(phase)
    }

    pub fn mark_phase_complete(&mut self, phase: &str) {
        self.completed_phases.insert(phase.to_string());
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

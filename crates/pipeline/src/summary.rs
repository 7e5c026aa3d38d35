//! Run Summary
//!
//! Per-phase status counts and the list of failed tools, rendered at the
//! end of a run and written next to the artifacts as `summary.json`.

use std::fmt;
use std::path::{Path, PathBuf};

use recon_core::CoreResult;
use serde::{Deserialize, Serialize};

use crate::executor::truncate_message;
use crate::models::{RunState, ScanDepth, ToolStatus};

/// File name of the persisted summary.
pub const SUMMARY_FILE: &str = "summary.json";

/// Bytes of an error message shown in the rendered summary.
const DISPLAY_MESSAGE_BYTES: usize = 160;

/// Count of tools per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub missing: usize,
    pub error: usize,
    pub timeout: usize,
    pub undefined: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: ToolStatus) {
        match status {
            ToolStatus::Ok => self.ok += 1,
            ToolStatus::Missing => self.missing += 1,
            ToolStatus::Error => self.error += 1,
            ToolStatus::Timeout => self.timeout += 1,
            ToolStatus::Undefined => self.undefined += 1,
        }
    }

    pub fn get(&self, status: ToolStatus) -> usize {
        match status {
            ToolStatus::Ok => self.ok,
            ToolStatus::Missing => self.missing,
            ToolStatus::Error => self.error,
            ToolStatus::Timeout => self.timeout,
            ToolStatus::Undefined => self.undefined,
        }
    }

    pub fn total(&self) -> usize {
        ToolStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.ok
    }
}

/// A tool whose latest result is not ok.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTool {
    pub phase: String,
    pub tool: String,
    pub status: ToolStatus,
    pub error_message: Option<String>,
}

/// Summary of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub name: String,
    pub completed: bool,
    pub counts: StatusCounts,
    pub merged_output: Option<PathBuf>,
    pub hook_error: Option<String>,
}

/// End-of-run report derived from a `RunState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub target: String,
    pub scan_depth: ScanDepth,
    pub phases: Vec<PhaseSummary>,
    pub failed_tools: Vec<FailedTool>,
    pub abort_reason: Option<String>,
    pub updated_at: String,
}

impl RunSummary {
    /// Build from state. Phases follow `phase_order`; phases present only in
    /// the state are appended in name order.
    pub fn from_state(state: &RunState, phase_order: &[String]) -> Self {
        let mut names: Vec<String> = phase_order.to_vec();
        for name in state.tool_results.keys().chain(state.completed_phases.iter()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let mut phases = Vec::new();
        let mut failed_tools = Vec::new();
        for name in names {
            let results = state.phase_results(&name);
            let completed = state.is_phase_complete(&name);
            if results.is_none() && !completed {
                continue;
            }

            let mut counts = StatusCounts::default();
            for result in results.into_iter().flat_map(|r| r.values()) {
                counts.add(result.status);
                if !result.status.is_ok() {
                    failed_tools.push(FailedTool {
                        phase: name.clone(),
                        tool: result.tool_name.clone(),
                        status: result.status,
                        error_message: result.error_message.clone(),
                    });
                }
            }

            phases.push(PhaseSummary {
                merged_output: state.phase_outputs.get(&name).cloned(),
                hook_error: state.phase_errors.get(&name).cloned(),
                name,
                completed,
                counts,
            });
        }

        Self {
            run_id: state.run_id.clone(),
            target: state.target.clone(),
            scan_depth: state.scan_depth,
            phases,
            failed_tools,
            abort_reason: state.abort_reason.clone(),
            updated_at: state.updated_at.clone(),
        }
    }

    /// Totals across phases.
    pub fn totals(&self) -> StatusCounts {
        self.phases
            .iter()
            .fold(StatusCounts::default(), |acc, phase| StatusCounts {
                ok: acc.ok + phase.counts.ok,
                missing: acc.missing + phase.counts.missing,
                error: acc.error + phase.counts.error,
                timeout: acc.timeout + phase.counts.timeout,
                undefined: acc.undefined + phase.counts.undefined,
            })
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Write as pretty JSON.
    pub fn write_json(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Recon summary for {} (depth: {}, run {})",
            self.target, self.scan_depth, self.run_id
        )?;
        writeln!(
            f,
            "{:<16} {:>4} {:>8} {:>6} {:>8} {:>10}  {}",
            "PHASE", "OK", "MISSING", "ERROR", "TIMEOUT", "UNDEFINED", "STATE"
        )?;
        for phase in &self.phases {
            let state = if phase.completed { "complete" } else { "incomplete" };
            writeln!(
                f,
                "{:<16} {:>4} {:>8} {:>6} {:>8} {:>10}  {}",
                phase.name,
                phase.counts.ok,
                phase.counts.missing,
                phase.counts.error,
                phase.counts.timeout,
                phase.counts.undefined,
                state
            )?;
            if let Some(error) = &phase.hook_error {
                writeln!(f, "  hook error: {}", error)?;
            }
        }

        if !self.failed_tools.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed tools (re-run with --resume --retry-failed):")?;
            for failed in &self.failed_tools {
                let message = failed
                    .error_message
                    .as_deref()
                    .and_then(|m| m.lines().find(|l| !l.trim().is_empty()))
                    .map(|m| truncate_message(m.trim(), DISPLAY_MESSAGE_BYTES))
                    .unwrap_or_default();
                writeln!(
                    f,
                    "  {}/{} [{}] {}",
                    failed.phase, failed.tool, failed.status, message
                )?;
            }
        }

        if let Some(reason) = &self.abort_reason {
            writeln!(f)?;
            writeln!(f, "Run aborted: {}", reason)?;
        }
        Ok(())
    }
}

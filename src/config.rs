//! Configuration Management
//!
//! Loads `OrchestratorConfig` from a TOML or JSON file (chosen by
//! extension). Search order: an explicit path, then
//! `~/.recon-orchestrator/config.toml`, else built-in defaults.
//!
//! Tool entries are decoded one at a time: a malformed entry is logged and
//! skipped, the rest of the registry still loads.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use recon_pipeline::executor::{ExecutorConfig, RetryPolicy, DEFAULT_MAX_ERROR_BYTES};
use recon_pipeline::registry::{PhaseDefinition, ToolRegistry, Workflow};
use recon_pipeline::scheduler::DEFAULT_CONCURRENCY;
use recon_pipeline::{ToolGroup, ToolSpec, ToolStage, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::user_config_path;

/// Run-wide defaults (`[defaults]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub threads: usize,
    /// TERM -> KILL grace period for timed-out tools
    pub grace_secs: u64,
    pub max_error_bytes: usize,
    pub retry: RetryPolicy,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            concurrency: DEFAULT_CONCURRENCY,
            threads: 10,
            grace_secs: 5,
            max_error_bytes: DEFAULT_MAX_ERROR_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

/// One `[tools.<name>]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEntry {
    pub command: String,
    #[serde(default)]
    pub group: Option<ToolGroup>,
    #[serde(default)]
    pub stage: Option<ToolStage>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub binary: Option<String>,
    #[serde(default)]
    pub critical: bool,
}

impl ToolEntry {
    /// Registry spec for this entry.
    pub fn to_spec(&self, name: &str) -> ToolSpec {
        let mut spec = ToolSpec::new(name, self.command.as_str())
            .with_group(self.group.unwrap_or_default())
            .with_stage(self.stage.unwrap_or_default())
            .critical(self.critical);
        spec.timeout_secs = self.timeout_secs;
        if let Some(binary) = &self.binary {
            spec = spec.with_binary(binary.as_str());
        }
        spec
    }
}

/// File layout before per-entry decoding.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    defaults: Defaults,
    params: BTreeMap<String, String>,
    tools: BTreeMap<String, serde_json::Value>,
    phases: Option<Vec<PhaseDefinition>>,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub defaults: Defaults,
    /// Extra template placeholders shared by every tool
    pub params: BTreeMap<String, String>,
    /// Tools added to, or overriding, the built-in registry
    pub tools: BTreeMap<String, ToolEntry>,
    /// Replaces the built-in workflow when present
    pub phases: Option<Vec<PhaseDefinition>>,
    /// File this config was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl OrchestratorConfig {
    /// Load using the search order. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(AppError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_file(path);
        }

        match user_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => {
                tracing::debug!("no config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let value: serde_json::Value = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        let mut config = Self::from_value(value)?;
        config.source = Some(path.to_path_buf());
        config.validate().map_err(AppError::validation)?;
        tracing::info!(path = %path.display(), tools = config.tools.len(), "loaded config");
        Ok(config)
    }

    fn from_value(value: serde_json::Value) -> AppResult<Self> {
        let raw: RawConfig = serde_json::from_value(value)?;
        let mut tools = BTreeMap::new();
        for (name, entry) in raw.tools {
            match serde_json::from_value::<ToolEntry>(entry) {
                Ok(entry) => {
                    tools.insert(name, entry);
                }
                Err(e) => tracing::warn!(tool = %name, error = %e, "skipping malformed tool entry"),
            }
        }
        Ok(Self {
            defaults: raw.defaults,
            params: raw.params,
            tools,
            phases: raw.phases,
            source: None,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let d = &self.defaults;
        if d.timeout_secs == 0 {
            return Err("defaults.timeout_secs must be at least 1".to_string());
        }
        if d.concurrency == 0 {
            return Err("defaults.concurrency must be at least 1".to_string());
        }
        if d.threads == 0 {
            return Err("defaults.threads must be at least 1".to_string());
        }
        if d.retry.max_attempts == 0 {
            return Err("defaults.retry.max_attempts must be at least 1".to_string());
        }

        if let Some(phases) = &self.phases {
            if phases.is_empty() {
                return Err("phases must not be empty when set".to_string());
            }
            let mut seen = BTreeSet::new();
            for phase in phases {
                if phase.name.trim().is_empty() {
                    return Err("phase name must not be empty".to_string());
                }
                if !seen.insert(phase.name.as_str()) {
                    return Err(format!("duplicate phase '{}'", phase.name));
                }
            }
        }

        Ok(())
    }

    /// Built-in tools plus valid config entries.
    pub fn registry(&self) -> ToolRegistry {
        let extras: BTreeSet<String> = self.params.keys().cloned().collect();
        let mut registry = ToolRegistry::builtin();
        for (name, entry) in &self.tools {
            registry.insert_checked(entry.to_spec(name), &extras);
        }
        registry
    }

    /// Configured workflow, or the built-in one.
    pub fn workflow(&self) -> Workflow {
        match &self.phases {
            Some(phases) => Workflow::new(phases.clone()),
            None => Workflow::builtin(),
        }
    }

    /// Executor settings, with an optional timeout override.
    pub fn executor_config(&self, timeout_override: Option<u64>) -> ExecutorConfig {
        ExecutorConfig {
            default_timeout_secs: timeout_override
                .filter(|t| *t > 0)
                .unwrap_or(self.defaults.timeout_secs),
            threads: self.defaults.threads,
            max_error_bytes: self.defaults.max_error_bytes,
            retry: self.defaults.retry,
            params: self.params.clone(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

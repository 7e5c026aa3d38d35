//! Tool Registry and Workflow
//!
//! The registry is loaded once at startup and only read afterwards. The
//! workflow is the ordered list of phase definitions; `Workflow::build`
//! turns it into the concrete phases for one scan depth.

use std::collections::{BTreeSet, HashMap};

use recon_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

use crate::hooks;
use crate::models::{Phase, ScanDepth, ToolGroup, ToolSpec, ToolStage};
use crate::template::{self, BUILTIN_PLACEHOLDERS};

// ============================================================================
// Tool Registry
// ============================================================================

/// Read-only mapping from tool name to spec, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from specs without validation. A later duplicate replaces the
    /// earlier entry in place.
    pub fn from_specs(specs: impl IntoIterator<Item = ToolSpec>) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.insert(spec);
        }
        registry
    }

    /// Built-in tool set.
    pub fn builtin() -> Self {
        Self::from_specs(builtin_tools())
    }

    pub fn insert(&mut self, spec: ToolSpec) {
        match self.index.get(&spec.name) {
            Some(&pos) => self.tools[pos] = spec,
            None => {
                self.index.insert(spec.name.clone(), self.tools.len());
                self.tools.push(spec);
            }
        }
    }

    /// Validate and insert; a rejected entry is logged and skipped.
    pub fn insert_checked(&mut self, spec: ToolSpec, extra_placeholders: &BTreeSet<String>) -> bool {
        match validate_spec(&spec, extra_placeholders) {
            Ok(()) => {
                self.insert(spec);
                true
            }
            Err(e) => {
                tracing::warn!(tool = %spec.name, error = %e, "skipping malformed tool entry");
                false
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&pos| &self.tools[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Group of a tool; unregistered names count as parallel.
    pub fn group_of(&self, name: &str) -> ToolGroup {
        self.get(name).map(|t| t.group).unwrap_or_default()
    }

    pub fn is_critical(&self, name: &str) -> bool {
        self.get(name).map(|t| t.critical).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Reject entries the executor could never run.
pub fn validate_spec(spec: &ToolSpec, extra_placeholders: &BTreeSet<String>) -> CoreResult<()> {
    if spec.name.trim().is_empty() {
        return Err(CoreError::config("tool name is empty"));
    }
    if spec.command_template.trim().is_empty() {
        return Err(CoreError::config(format!("tool '{}' has an empty command", spec.name)));
    }
    if spec.required_binary.trim().is_empty() {
        return Err(CoreError::config(format!("tool '{}' has no required binary", spec.name)));
    }
    if spec.timeout_secs == Some(0) {
        return Err(CoreError::config(format!("tool '{}' has a zero timeout", spec.name)));
    }
    for name in template::placeholders(&spec.command_template)? {
        if !BUILTIN_PLACEHOLDERS.contains(&name.as_str()) && !extra_placeholders.contains(&name) {
            return Err(CoreError::config(format!(
                "tool '{}' uses unknown placeholder '{{{}}}'",
                spec.name, name
            )));
        }
    }
    Ok(())
}

fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("subfinder", "subfinder -d {target} -silent -t {threads} -o {output}"),
        ToolSpec::new("assetfinder", "assetfinder --subs-only {target}"),
        ToolSpec::new("amass", "amass enum -passive -d {target} -o {output}")
            .with_stage(ToolStage::Deep)
            .with_timeout(900),
        ToolSpec::new("findomain", "findomain -t {target} -q -u {output}")
            .with_stage(ToolStage::Deep),
        ToolSpec::new("dnsx", "dnsx -l {input} -silent -t {threads} -o {output}"),
        ToolSpec::new("httpx", "httpx -l {input} -silent -threads {threads} -o {output}"),
        ToolSpec::new("naabu", "naabu -list {input} -silent -o {output}")
            .with_stage(ToolStage::Deep)
            .with_timeout(600),
        ToolSpec::new("gau", "gau --threads {threads} --subs {target}"),
        ToolSpec::new("waybackurls", "waybackurls {target}").with_stage(ToolStage::Deep),
        ToolSpec::new("katana", "katana -list {input} -silent -o {output}")
            .with_stage(ToolStage::Deeper)
            .with_timeout(900),
        ToolSpec::new("nuclei", "nuclei -l {input} -silent -o {output}")
            .with_group(ToolGroup::Serial)
            .with_stage(ToolStage::Deep)
            .with_timeout(1800),
        ToolSpec::new("gowitness", "gowitness file -f {input} -P {outdir}/screenshots")
            .with_group(ToolGroup::Serial)
            .with_stage(ToolStage::Deeper)
            .with_timeout(1800),
    ]
}

// ============================================================================
// Workflow
// ============================================================================

/// Static definition of one phase, before depth filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub name: String,
    pub tools: Vec<String>,
    #[serde(default)]
    pub hook: Option<String>,
    /// Minimum depth at which the phase runs at all
    #[serde(default)]
    pub min_depth: ToolStage,
}

impl PhaseDefinition {
    pub fn new(name: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            hook: None,
            min_depth: ToolStage::Any,
        }
    }

    /// Attach a hook identifier
    pub fn with_hook(mut self, hook: &str) -> Self {
        self.hook = Some(hook.to_string());
        self
    }

    /// Set the minimum depth
    pub fn with_min_depth(mut self, stage: ToolStage) -> Self {
        self.min_depth = stage;
        self
    }
}

/// Ordered phase definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub phases: Vec<PhaseDefinition>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Workflow {
    pub fn new(phases: Vec<PhaseDefinition>) -> Self {
        Self { phases }
    }

    /// Built-in subdomain -> resolve -> probe -> crawl -> scan workflow.
    pub fn builtin() -> Self {
        Self::new(vec![
            PhaseDefinition::new("subdomains", &["subfinder", "assetfinder", "amass", "findomain"])
                .with_hook(hooks::MERGE_HOSTS),
            PhaseDefinition::new("resolve", &["dnsx"]).with_hook(hooks::MERGE_HOSTS),
            PhaseDefinition::new("probe", &["httpx", "naabu"]).with_hook(hooks::MERGE),
            PhaseDefinition::new("crawl", &["gau", "waybackurls", "katana"]).with_hook(hooks::MERGE),
            PhaseDefinition::new("scan", &["nuclei", "gowitness"]).with_min_depth(ToolStage::Deep),
        ])
    }

    /// Phase names in workflow order.
    pub fn phase_names(&self) -> Vec<String> {
        self.phases.iter().map(|p| p.name.clone()).collect()
    }

    /// Concrete phases for a depth.
    ///
    /// Regular depths keep tools whose stage allows the depth; names missing
    /// from the registry are kept so they surface as `undefined`. `Custom`
    /// keeps exactly the tools in `selection`, ignoring stages. Phases left
    /// without tools are dropped.
    pub fn build(
        &self,
        registry: &ToolRegistry,
        depth: ScanDepth,
        selection: &[String],
    ) -> CoreResult<Vec<Phase>> {
        if depth == ScanDepth::Custom && selection.is_empty() {
            return Err(CoreError::config("custom depth requires at least one tool"));
        }

        let mut phases = Vec::new();
        for def in &self.phases {
            if depth != ScanDepth::Custom && !def.min_depth.allows(depth) {
                continue;
            }
            let tools: Vec<String> = def
                .tools
                .iter()
                .filter(|name| match depth {
                    ScanDepth::Custom => selection.contains(name),
                    _ => registry
                        .get(name)
                        .map(|spec| spec.stage.allows(depth))
                        .unwrap_or(true),
                })
                .cloned()
                .collect();
            if tools.is_empty() {
                continue;
            }
            let mut phase = Phase::new(&def.name, tools);
            phase.post_process_hook = def.hook.clone();
            phases.push(phase);
        }

        if depth == ScanDepth::Custom {
            for name in selection {
                if !phases.iter().any(|p| p.tool_names.contains(name)) {
                    tracing::warn!(tool = %name, "selected tool is not part of any phase");
                }
            }
        }

        if phases.is_empty() {
            return Err(CoreError::config(format!("no phases to run at depth '{}'", depth)));
        }
        Ok(phases)
    }
}

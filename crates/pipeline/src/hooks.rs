//! Phase Hooks
//!
//! Post-process routines run once every tool of a phase has a result.
//! Hooks are registered by identifier at startup; an unknown identifier is
//! reported as an error by the caller, never looked up dynamically.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use recon_core::{CoreError, CoreResult};

use crate::aggregator::{Normalization, ResultAggregator};

/// Hook identifier for a case-sensitive merge.
pub const MERGE: &str = "merge";
/// Hook identifier for a lower-cased hostname merge.
pub const MERGE_HOSTS: &str = "merge_hosts";

/// Inputs handed to a hook.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub phase: String,
    /// Tool artifacts in the phase's tool order
    pub artifacts: Vec<PathBuf>,
    /// Where the merged candidate list should be written
    pub destination: PathBuf,
}

/// What a hook produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    /// File to feed the next phase as `{input}`
    pub merged_path: Option<PathBuf>,
    pub candidates: usize,
}

/// A phase post-process routine.
pub trait PhaseHook: Send + Sync {
    fn run(&self, ctx: &HookContext) -> CoreResult<HookOutput>;
}

/// Merge hook backed by [`ResultAggregator`].
#[derive(Debug, Clone, Default)]
pub struct MergeHook {
    aggregator: ResultAggregator,
}

impl MergeHook {
    pub fn new(normalization: Normalization) -> Self {
        Self {
            aggregator: ResultAggregator::new().with_normalization(normalization),
        }
    }
}

impl PhaseHook for MergeHook {
    fn run(&self, ctx: &HookContext) -> CoreResult<HookOutput> {
        let candidates = self
            .aggregator
            .merge_to_file(&ctx.phase, &ctx.artifacts, &ctx.destination)
            .map_err(|e| CoreError::hook(format!("merge failed for phase '{}': {}", ctx.phase, e)))?;
        Ok(HookOutput {
            merged_path: Some(ctx.destination.clone()),
            candidates,
        })
    }
}

/// Identifier -> hook.
#[derive(Clone)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn PhaseHook>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl HookRegistry {
    /// Registry without any hooks.
    pub fn empty() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Registry with `merge` and `merge_hosts`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(MERGE, Arc::new(MergeHook::new(Normalization::Exact)));
        registry.register(MERGE_HOSTS, Arc::new(MergeHook::new(Normalization::Lowercase)));
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, hook: Arc<dyn PhaseHook>) {
        self.hooks.insert(id.into(), hook);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn PhaseHook>> {
        self.hooks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hooks.contains_key(id)
    }

    /// Run a hook by identifier.
    pub fn run(&self, id: &str, ctx: &HookContext) -> CoreResult<HookOutput> {
        let hook = self
            .get(id)
            .ok_or_else(|| CoreError::hook(format!("unknown hook '{}'", id)))?;
        hook.run(ctx)
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.hooks.keys().collect();
        ids.sort();
        f.debug_struct("HookRegistry").field("hooks", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_hooks_registered() {
        let registry = HookRegistry::with_builtin();
        assert!(registry.contains(MERGE));
        assert!(registry.contains(MERGE_HOSTS));
        assert!(!registry.contains("screenshot"));
    }

    #[test]
    fn test_merge_hosts_lowercases() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "WWW.Example.com\n").unwrap();
        std::fs::write(&b, "www.example.com\nmail.example.com\n").unwrap();

        let ctx = HookContext {
            phase: "enum".to_string(),
            artifacts: vec![a, b],
            destination: dir.path().join("enum").join("merged.txt"),
        };
        let output = HookRegistry::with_builtin().run(MERGE_HOSTS, &ctx).unwrap();

        assert_eq!(output.candidates, 2);
        assert_eq!(
            std::fs::read_to_string(output.merged_path.unwrap()).unwrap(),
            "www.example.com\nmail.example.com\n"
        );
    }

    #[test]
    fn test_unknown_hook_is_error() {
        let ctx = HookContext {
            phase: "enum".to_string(),
            artifacts: vec![],
            destination: PathBuf::from("/nonexistent/merged.txt"),
        };
        let err = HookRegistry::with_builtin().run("mystery", &ctx).unwrap_err();
        assert!(matches!(err, CoreError::Hook(_)));
    }
}

//! Checkpoint Store
//!
//! Persists one `RunState` per target as JSON under `{out_dir}/.state/`.
//! Saves go through a temp file in the same directory followed by a rename,
//! so a concurrent or later `load` sees either the previous or the new
//! complete state.
//!
//! `StateHandle` is the single lock around a run's state: every mutation
//! and the save that follows it happen under that lock.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use recon_core::{CoreError, CoreResult};
use tokio::sync::Mutex;

use crate::models::{RunState, ToolRunResult};

/// Directory (relative to the output directory) holding state files.
pub const STATE_DIR: &str = ".state";

/// File-backed store of run snapshots, keyed by target.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    state_dir: PathBuf,
}

impl CheckpointStore {
    /// Store rooted at `{out_dir}/.state`.
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: out_dir.as_ref().join(STATE_DIR),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of the state file for a target.
    pub fn state_path(&self, target: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", sanitize_target(target)))
    }

    /// Load the persisted state of a target, if any.
    pub fn load(&self, target: &str) -> CoreResult<Option<RunState>> {
        let path = self.state_path(target);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let state: RunState = serde_json::from_str(&content).map_err(|e| {
            CoreError::checkpoint(format!("corrupt state file {}: {}", path.display(), e))
        })?;
        Ok(Some(state))
    }

    /// Atomically replace the persisted state of `state.target`.
    pub fn save(&self, state: &RunState) -> CoreResult<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        let path = self.state_path(&state.target);
        let content = serde_json::to_string_pretty(state)?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.state_dir)?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path)
            .map_err(|e| CoreError::checkpoint(format!("cannot replace {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Delete the persisted state of a target. Returns whether a file existed.
    pub fn clear(&self, target: &str) -> CoreResult<bool> {
        let path = self.state_path(target);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Percent-encoded `*`; `%` never appears in a valid target.
const WILDCARD_STEM: &str = "%2a";

/// Map a target to a file-name-safe stem.
pub fn sanitize_target(target: &str) -> String {
    let mut stem = String::with_capacity(target.len());
    for c in target.chars() {
        match c {
            '*' => stem.push_str(WILDCARD_STEM),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => {
                stem.push(c.to_ascii_lowercase())
            }
            _ => stem.push('_'),
        }
    }
    stem
}

// ============================================================================
// Shared state handle
// ============================================================================

/// Shared, lock-protected run state with write-through persistence.
///
/// Save failures are logged at error level and counted; they never abort
/// the run.
#[derive(Debug, Clone)]
pub struct StateHandle {
    state: Arc<Mutex<RunState>>,
    store: Option<Arc<CheckpointStore>>,
    save_failures: Arc<AtomicUsize>,
}

impl StateHandle {
    pub fn new(state: RunState, store: CheckpointStore) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            store: Some(Arc::new(store)),
            save_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle that never touches the filesystem.
    pub fn in_memory(state: RunState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            store: None,
            save_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Record a tool attempt and persist.
    pub async fn record(&self, result: ToolRunResult) {
        self.update(|state| state.record_result(result)).await;
    }

    /// Mutate under the lock, then persist before releasing it.
    pub async fn update<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> R {
        let mut state = self.state.lock().await;
        let out = f(&mut state);
        state.touch();
        self.persist(&state).await;
        out
    }

    /// Read under the lock.
    pub async fn read<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// Clone of the current state.
    pub async fn snapshot(&self) -> RunState {
        self.state.lock().await.clone()
    }

    /// Number of saves that failed so far.
    pub fn save_failures(&self) -> usize {
        self.save_failures.load(Ordering::Relaxed)
    }

    /// Save on the blocking pool; the caller still holds the state lock, so
    /// saves land in mutation order.
    async fn persist(&self, state: &RunState) {
        let Some(store) = &self.store else {
            return;
        };
        let task_store = store.clone();
        let snapshot = state.clone();
        let saved = tokio::task::spawn_blocking(move || task_store.save(&snapshot))
            .await
            .unwrap_or_else(|e| Err(CoreError::internal(format!("checkpoint task failed: {}", e))));
        if let Err(e) = saved {
            self.save_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                target_domain = %state.target,
                path = %store.state_path(&state.target).display(),
                error = %e,
                "failed to save checkpoint"
            );
        }
    }
}

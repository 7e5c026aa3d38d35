//! Path Utilities
//!
//! Resolves the per-user config location and the per-run artifact layout.

use std::path::{Path, PathBuf};

use recon_pipeline::summary::SUMMARY_FILE;

use crate::utils::error::{AppError, AppResult};

/// Default artifact directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "recon_results";

/// Log file written inside the output directory.
pub const LOG_FILE: &str = "orchestrator.log";

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the orchestrator directory (~/.recon-orchestrator/)
pub fn orchestrator_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".recon-orchestrator"))
}

/// Get the user config path (~/.recon-orchestrator/config.toml)
pub fn user_config_path() -> AppResult<PathBuf> {
    Ok(orchestrator_dir()?.join("config.toml"))
}

/// Path of the end-of-run summary
pub fn summary_path(out_dir: &Path) -> PathBuf {
    out_dir.join(SUMMARY_FILE)
}

/// Default log file path for a run
pub fn log_path(out_dir: &Path) -> PathBuf {
    out_dir.join(LOG_FILE)
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

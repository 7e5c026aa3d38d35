//! Recon Orchestrator
//!
//! Application layer over `recon-pipeline`:
//! - `config` - TOML/JSON configuration and registry overrides
//! - `logging` - tracing subscriber setup
//! - `orchestrator` - the run driver and the inventory/summary/clear-state operations
//! - `utils` - application error type and path helpers

pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod utils;

pub use config::OrchestratorConfig;
pub use orchestrator::{clear_state, validate_target, Orchestrator, RunOptions, RunOutcome};
pub use utils::error::{AppError, AppResult};

//! Logging
//!
//! Initialises `tracing-subscriber`: an `EnvFilter` from `RUST_LOG` or
//! `RECON_ORCHESTRATOR_LOG`, a stderr layer and an optional plain-text file
//! layer.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::utils::error::{AppError, AppResult};

/// Environment variable consulted when `RUST_LOG` is unset.
pub const LOG_ENV: &str = "RECON_ORCHESTRATOR_LOG";

/// Filter used when neither variable is set.
pub const DEFAULT_FILTER: &str = "recon_orchestrator=info,recon_pipeline=info";

fn env_filter() -> EnvFilter {
    let directives = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. `log_file` is appended to when given.
pub fn init_logging(log_file: Option<&Path>) -> AppResult<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::config(format!("failed to initialise logging: {}", e)))
}

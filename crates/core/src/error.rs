//! Core Error Types
//!
//! Defines the foundational error types used across the recon orchestrator
//! workspace. These error types are dependency-light (only thiserror + std +
//! serde_json) so every crate can share them.
//!
//! The application crate extends these with additional variants (TOML
//! parsing, CLI validation) that require heavier dependencies.

use thiserror::Error;

/// Core error type for the recon orchestrator workspace.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration errors (malformed registry entry, bad workflow)
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Command template could not be resolved
    #[error("Template error: {0}")]
    Template(String),

    /// The OS refused to start a subprocess
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Checkpoint persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Phase post-process hook errors
    #[error("Hook error: {0}")]
    Hook(String),

    /// A tool flagged critical did not finish with status ok
    #[error("Critical tool '{tool}' failed in phase '{phase}': {message}")]
    CriticalTool {
        phase: String,
        tool: String,
        message: String,
    },

    /// The run was interrupted by the operator
    #[error("Run cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for core errors
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a spawn error
    pub fn spawn(msg: impl Into<String>) -> Self {
        Self::Spawn(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a hook error
    pub fn hook(msg: impl Into<String>) -> Self {
        Self::Hook(msg.into())
    }

    /// Create a critical tool failure
    pub fn critical_tool(
        phase: impl Into<String>,
        tool: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CriticalTool {
            phase: phase.into(),
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error must stop phase iteration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::CriticalTool { .. } | CoreError::Cancelled)
    }
}

/// Convert CoreError to a string
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}

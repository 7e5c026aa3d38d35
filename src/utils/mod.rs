//! Utilities
//!
//! Application error type and the on-disk locations of config, logs,
//! checkpoints and summaries.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;

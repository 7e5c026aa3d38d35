//! Recon Core
//!
//! Error types shared by every crate of the recon orchestrator workspace.
//! This crate depends on nothing else in the workspace.

pub mod error;

pub use error::{CoreError, CoreResult};

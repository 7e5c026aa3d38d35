//! Integration Tests Module
//!
//! End-to-end tests against real `sh` subprocesses: phase scheduling,
//! timeouts, checkpoint persistence, merging and full orchestrated runs.

// Shared fixtures
mod common;

// Result merging
mod aggregator_test;

// Checkpoint persistence and resume
mod checkpoint_test;

// Subprocess timeouts and process-group cleanup
mod runner_test;

// Phase scheduling, concurrency and failure isolation
mod scheduler_test;

// Full runs through the orchestrator
mod orchestrator_test;

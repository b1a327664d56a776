//! Data models module
//!
//! Contains the per-worker test run, disk identity and persisted
//! run records.

pub mod run;

// Re-export commonly used types
pub use run::{DiskIdentity, RunRecord, StopReason, TestRun, WorkerKind};

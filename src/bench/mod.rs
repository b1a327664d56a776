//! Benchmark engine module
//!
//! Contains the write and read workers, their lifecycle and the run
//! coordinator that sequences and finalizes them.

pub mod cancel;
pub mod coordinator;
pub mod reader;
pub mod worker;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use cancel::{CancelToken, ShutdownSignals};
pub use coordinator::{FinalizeOutcome, Finalizer, RunSession};
pub use worker::{ProgressReporter, ProgressUpdate, RawSeries, WorkerHandle, WorkerState};

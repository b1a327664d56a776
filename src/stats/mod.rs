//! Series statistics module
//!
//! Chunk aggregation, typical-performance extraction and cross-run
//! per-GB averaging.

pub mod average;
pub mod chunk;
pub mod modes;

// Re-export commonly used types
pub use average::{cross_run_average, gb_average, to_chunks};
pub use chunk::{aggregate, chunk_width, Chunk, ChunkSeries};
pub use modes::{estimate_data_size_gb, summarize, summarize_with, Histogram, ModeParams, Pctl, Pctls};

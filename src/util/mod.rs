//! Utility functions module
//!
//! Contains helpers for byte sizes and throughput.

pub mod units;

// Re-export commonly used functions
pub use units::{block_throughput_mbps, calculate_throughput_mbps, format_bytes, parse_bytes};

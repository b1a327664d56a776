//! Units formatting and conversion utilities
//!
//! Human-readable and parsed byte sizes, plus the per-block throughput
//! calculation used by the sample workers.

use std::time::Duration;

use crate::MIB;

/// Shortest block duration used when converting a block timing to MB/s
pub const MIN_BLOCK_TIME: Duration = Duration::from_micros(1);

/// Format bytes into human-readable size with appropriate units
///
/// # Examples
/// ```
/// use slowmark::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(1073741824), "1.0 GiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Parse human-readable size string into bytes
///
/// Supports units: B, KB, MB, GB, TB, KiB, MiB, GiB, TiB
///
/// # Examples
/// ```
/// use slowmark::util::units::parse_bytes;
///
/// assert_eq!(parse_bytes("4 KiB").unwrap(), 4096);
/// assert_eq!(parse_bytes("4MiB").unwrap(), 4194304);
/// ```
pub fn parse_bytes(input: &str) -> Result<u64, String> {
    let input = input.trim();

    let (number_part, unit_part) = if let Some(space_pos) = input.rfind(' ') {
        (&input[..space_pos], &input[space_pos + 1..])
    } else {
        let split_pos = input
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| i)
            .unwrap_or(input.len());
        (&input[..split_pos], &input[split_pos..])
    };

    let number: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", number_part))?;

    if number < 0.0 {
        return Err("Size cannot be negative".to_string());
    }

    let multiplier = match unit_part.to_uppercase().as_str() {
        "" | "B" => 1u64,
        "KB" => 1_000u64,
        "MB" => 1_000_000u64,
        "GB" => 1_000_000_000u64,
        "TB" => 1_000_000_000_000u64,
        "K" | "KIB" => 1_024u64,
        "M" | "MIB" => 1_048_576u64,
        "G" | "GIB" => 1_073_741_824u64,
        "TIB" => 1_099_511_627_776u64,
        _ => return Err(format!("Unknown unit: {}", unit_part)),
    };

    Ok((number * multiplier as f64) as u64)
}

/// Calculate throughput in MB/s from bytes and duration
///
/// Returns 0.0 for a zero duration.
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }

    bytes as f64 / MIB as f64 / duration.as_secs_f64()
}

/// Throughput of a single timed block in MB/s
///
/// The elapsed time is clamped to [`MIN_BLOCK_TIME`] so the sample stays
/// finite even when the clock did not advance.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use slowmark::util::units::block_throughput_mbps;
///
/// let mbps = block_throughput_mbps(1048576, Duration::from_millis(500));
/// assert!((mbps - 2.0).abs() < 1e-9);
/// assert!(block_throughput_mbps(4096, Duration::ZERO).is_finite());
/// ```
pub fn block_throughput_mbps(block_bytes: u64, elapsed: Duration) -> f64 {
    calculate_throughput_mbps(block_bytes, elapsed.max(MIN_BLOCK_TIME))
}

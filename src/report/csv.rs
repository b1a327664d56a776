//! CSV formats of the report files
//!
//! Chunk files list one chunk per row; average files hold two rows, the
//! GB captions and one labelled row of per-GB values.

use crate::stats::Chunk;
use crate::{Result, SlowMarkError};
use std::fmt::Write as _;

pub const CHUNKS_HEADER: &str = "N,MB,min,avgMin,avg,avgMax,max";
pub const AVERAGE_CAPTION: &str = "Offset GB";

/// Render a chunk series, rows numbered from 1
pub fn format_chunks(chunks: &[Chunk]) -> String {
    let mut out = String::with_capacity(48 * (chunks.len() + 1));
    out.push_str(CHUNKS_HEADER);
    out.push('\n');

    for (i, c) in chunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{},{:.1},{:.1},{:.1},{:.1},{:.1},{:.1}",
            i + 1,
            c.offset_mb,
            c.min,
            c.avg_min,
            c.avg,
            c.avg_max,
            c.max
        );
    }
    out
}

/// Parse a chunk file written by [`format_chunks`]
///
/// The header row and blank lines are skipped; the row number is ignored.
pub fn parse_chunks(content: &str) -> Result<Vec<Chunk>> {
    content
        .lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let fields = line
                .split(',')
                .skip(1)
                .map(|f| f.trim().parse::<f64>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    SlowMarkError::ReportError(format!("line {}: bad number: {}", n + 1, e))
                })?;

            match fields[..] {
                [offset_mb, min, avg_min, avg, avg_max, max] => {
                    Ok(Chunk::new(offset_mb, min, avg_min, avg, avg_max, max))
                }
                _ => Err(SlowMarkError::ReportError(format!(
                    "line {}: expected 7 columns, got {}",
                    n + 1,
                    fields.len() + 1
                ))),
            }
        })
        .collect()
}

/// Caption row `Offset GB,1,2,…` for `count` values
pub fn average_caption(count: usize) -> String {
    let mut out = String::from(AVERAGE_CAPTION);
    for i in 1..=count {
        let _ = write!(out, ",{}", i);
    }
    out
}

/// Value row `<label>,v1,v2,…`
pub fn average_row(label: &str, values: &[f64]) -> String {
    let mut out = String::from(label);
    for v in values {
        let _ = write!(out, ",{:.1}", v);
    }
    out
}

/// Complete average file: caption row and one value row
pub fn format_average(label: &str, values: &[f64]) -> String {
    format!("{}\n{}\n", average_caption(values.len()), average_row(label, values))
}

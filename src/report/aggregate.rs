//! Aggregation over report directories
//!
//! Rebuilds the per-GB averages of every chunk file in a directory and
//! merges them into one `All-<test>.csv` per test kind and size.

use crate::report::csv::{average_caption, average_row, format_average, parse_chunks};
use crate::report::ReportName;
use crate::stats::{cross_run_average, gb_average, Chunk};
use crate::{Result, SlowMarkError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Label of the cross-model row in merged files
pub const AVERAGE_ROW_LABEL: &str = "Average";

/// Outcome of one aggregation pass
#[derive(Debug, Default)]
pub struct AggregateSummary {
    /// Chunk files that were read successfully
    pub chunk_files: usize,
    /// Merged files written, one per test
    pub outputs: Vec<PathBuf>,
}

struct ModelSeries {
    model: String,
    chunks: Vec<Chunk>,
    averages: Vec<f64>,
}

/// Aggregate every `<model>_(<test>)_Chunks.csv` directly inside `input`
///
/// Each chunk file gets its sibling `_Average.csv` rewritten; merged files
/// go to `output`. Unreadable or malformed files are skipped.
pub fn aggregate_dir(input: &Path, output: &Path) -> Result<AggregateSummary> {
    info!(input = %input.display(), "Running aggregation");

    let mut files: Vec<PathBuf> = fs::read_dir(input)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut by_test: BTreeMap<String, Vec<ModelSeries>> = BTreeMap::new();
    let mut summary = AggregateSummary::default();

    for path in files {
        let Some(name) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(ReportName::parse)
        else {
            continue;
        };
        if name.output != "Chunks" {
            continue;
        }

        let chunks = match fs::read_to_string(&path).map_err(SlowMarkError::from).and_then(|c| parse_chunks(&c)) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping chunk file");
                continue;
            }
        };
        summary.chunk_files += 1;

        let averages = gb_average(&chunks);
        let average_name = ReportName {
            output: "Average".to_string(),
            ..name.clone()
        };
        let average_path = path.with_file_name(average_name.file_name());
        if let Err(e) = fs::write(&average_path, format_average(&name.model, &averages)) {
            warn!(file = %average_path.display(), error = %e, "Could not rewrite average file");
        }

        by_test.entry(name.test).or_default().push(ModelSeries {
            model: name.model,
            chunks,
            averages,
        });
    }

    if !by_test.is_empty() {
        fs::create_dir_all(output)?;
    }

    for (test, series) in &by_test {
        let runs: Vec<Vec<Chunk>> = series.iter().map(|s| s.chunks.clone()).collect();
        let merged = cross_run_average(&runs);

        let mut content = average_caption(merged.len());
        content.push('\n');
        for s in series {
            content.push_str(&average_row(&s.model, &s.averages));
            content.push('\n');
        }
        content.push_str(&average_row(AVERAGE_ROW_LABEL, &merged));
        content.push('\n');

        let out_path = output.join(format!("All-{}.csv", test));
        fs::write(&out_path, content)?;
        info!(file = %out_path.display(), models = series.len(), "Wrote merged averages");
        summary.outputs.push(out_path);
    }

    Ok(summary)
}

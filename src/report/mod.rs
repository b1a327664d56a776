//! Report output module
//!
//! Receives finished runs from the coordinator and turns them into CSV and
//! JSON files plus a console summary.

pub mod aggregate;
pub mod csv;

use crate::config::persistence::ResultsStorage;
use crate::models::{RunRecord, TestRun, WorkerKind};
use crate::stats::{estimate_data_size_gb, gb_average, summarize, to_chunks};
use crate::util::format_bytes;
use crate::{Result, SlowMarkError};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub use aggregate::{aggregate_dir, AggregateSummary};

/// Consumer of finalized runs
pub trait ReportSink: Send + Sync {
    /// Called once per run, in worker order
    fn write_run(&self, run: &TestRun) -> Result<()>;

    /// Called once after every run was passed to [`write_run`](Self::write_run)
    fn write_summary(&self, runs: &[TestRun]) -> Result<()>;
}

/// File name stem of a run's reports: `<Model>_(<Kind>-<N>gb)`
pub fn report_stem(model_stem: &str, kind: WorkerKind, data_size_gb: f64) -> String {
    format!("{}_({}-{}gb)", model_stem, kind.label(), data_size_gb as u64)
}

/// Parts of a report file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportName {
    pub model: String,
    /// Kind and size, e.g. `Write-50gb`
    pub test: String,
    /// `Chunks`, `Average` or `Summary`
    pub output: String,
}

impl ReportName {
    /// Split `<model>_(<test>)_<output>.csv`
    pub fn parse(file_name: &str) -> Option<Self> {
        let name = file_name.strip_suffix(".csv")?;
        let close = name.rfind(')')?;
        let output = name[close + 1..].trim_start_matches('_');
        if output.contains('.') {
            return None;
        }

        let head = &name[..close];
        let open = head.rfind("_(")?;
        Some(Self {
            model: head[..open].to_string(),
            test: head[open + 2..].to_string(),
            output: output.to_string(),
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}_({})_{}.csv", self.model, self.test, self.output)
    }
}

/// Writes reports into a timestamped directory per session
#[derive(Debug)]
pub struct FileReporter {
    dir: PathBuf,
    model_stem: String,
    history: Option<ResultsStorage>,
}

impl FileReporter {
    /// Reporter writing into `<report_dir>/<Model>_<YYYY-mm-dd_HH-MM-SS>`
    pub fn new(report_dir: &Path, model: &str, started: DateTime<Local>) -> Self {
        let model_stem = model.replace(' ', "_");
        let dir = report_dir.join(format!(
            "{}_{}",
            model_stem,
            started.format("%Y-%m-%d_%H-%M-%S")
        ));
        Self {
            dir,
            model_stem,
            history: None,
        }
    }

    /// Also append every run summary to the run history
    pub fn with_history(mut self, storage: ResultsStorage) -> Self {
        self.history = Some(storage);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            SlowMarkError::ReportError(format!("cannot create {}: {}", self.dir.display(), e))
        })?;

        let path = self.dir.join(name);
        fs::write(&path, content).map_err(|e| {
            SlowMarkError::ReportError(format!("cannot write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

impl ReportSink for FileReporter {
    fn write_run(&self, run: &TestRun) -> Result<()> {
        if run.chunks.is_empty() {
            info!(kind = %run.kind, "No samples, skipping report files");
            return Ok(());
        }

        let stem = report_stem(&run.disk.file_stem(), run.kind, run.data_size_gb());

        let chunks_path = self.write_file(&format!("{}_Chunks.csv", stem), &csv::format_chunks(&run.chunks))?;
        let averages = gb_average(&run.chunks);
        let average_path = self.write_file(
            &format!("{}_Average.csv", stem),
            &csv::format_average(&run.disk.model, &averages),
        )?;
        let json_path = self.write_file(
            &format!("{}_Summary.json", stem),
            &serde_json::to_string_pretty(run)?,
        )?;

        for path in [&chunks_path, &average_path, &json_path] {
            println!("Report: {}", path.display());
        }
        info!(kind = %run.kind, dir = %self.dir.display(), chunks = run.chunks.len(), "Run reported");
        Ok(())
    }

    fn write_summary(&self, runs: &[TestRun]) -> Result<()> {
        let text = render_summary(runs);
        println!("{}", text);

        if runs.iter().any(|r| !r.chunks.is_empty()) {
            self.write_file(&format!("{}_Summary.txt", self.model_stem), &text)?;
        }

        if let Some(history) = &self.history {
            let measured: Vec<TestRun> = runs.iter().filter(|r| !r.series.is_empty()).cloned().collect();
            if let Err(e) = history.append_runs(&measured) {
                warn!(error = %e, "Could not update run history");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Console summary of a session's runs
pub fn render_summary(runs: &[TestRun]) -> String {
    let mut out = String::new();

    for run in runs {
        let bytes = run.series.len() as u64 * run.block_size;
        let elapsed = Duration::from_millis(run.elapsed.as_millis() as u64);
        let _ = writeln!(
            out,
            "{} test on {}: {} in {} ({})",
            run.kind,
            run.disk.model,
            format_bytes(bytes),
            humantime::format_duration(elapsed),
            run.stop_reason
        );

        match &run.pctls {
            Some(pctls) => out.push_str(&pctls.to_string()),
            None => out.push_str("  not enough data for a summary\n"),
        }

        let per_gb = to_chunks(&gb_average(&run.chunks));
        if let Ok(pctls) = summarize(&per_gb, estimate_data_size_gb(&per_gb)) {
            out.push_str("  per-GB average:\n");
            out.push_str(&pctls.to_string());
        }
    }

    out
}

/// Listing of stored run records, newest last
pub fn render_history(records: &[RunRecord], total: usize) -> String {
    if records.is_empty() {
        return "No runs recorded yet\n".to_string();
    }

    let mut out = format!("Showing {} of {} recorded runs\n", records.len(), total);
    for record in records {
        let _ = writeln!(out, "  {}", record.summary());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiskIdentity;
    use crate::MIB;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn analysed_run(kind: WorkerKind, samples: usize) -> TestRun {
        let mut run = TestRun::new(kind, DiskIdentity::new("Test Disk", PathBuf::from(".")), 4 * MIB);
        for i in 0..samples {
            run.series.push(if i < samples / 4 { 2000.0 } else { 400.0 + (i % 7) as f64 });
        }
        run.analyze(680).unwrap();
        run
    }

    fn reporter(root: &Path) -> FileReporter {
        let started = Local.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap();
        FileReporter::new(root, "Test Disk", started)
    }

    #[test]
    fn test_report_names() {
        assert_eq!(report_stem("Test_Disk", WorkerKind::Write, 50.7), "Test_Disk_(Write-50gb)");

        let name = ReportName::parse("My_(Odd)_Disk_(Read-2gb)_Chunks.csv").unwrap();
        assert_eq!(name.model, "My_(Odd)_Disk");
        assert_eq!(name.test, "Read-2gb");
        assert_eq!(name.output, "Chunks");
        assert_eq!(name.file_name(), "My_(Odd)_Disk_(Read-2gb)_Chunks.csv");

        assert!(ReportName::parse("All-Read-2gb.csv").is_none());
        assert!(ReportName::parse("Disk_(Read-2gb)_Chunks.png").is_none());
    }

    #[test]
    fn test_reporter_directory_name() {
        let temp_dir = tempdir().unwrap();
        let reporter = reporter(temp_dir.path());
        assert_eq!(reporter.dir(), temp_dir.path().join("Test_Disk_2024-05-17_09-30-05"));
    }

    #[test]
    fn test_write_run_files() {
        let temp_dir = tempdir().unwrap();
        let reporter = reporter(temp_dir.path());
        let run = analysed_run(WorkerKind::Write, 1024);

        reporter.write_run(&run).unwrap();

        let chunks = fs::read_to_string(reporter.dir().join("Test_Disk_(Write-4gb)_Chunks.csv")).unwrap();
        assert!(chunks.starts_with("N,MB,min,avgMin,avg,avgMax,max\n1,0.0,"));
        assert_eq!(chunks.lines().count(), run.chunks.len() + 1);

        let average = fs::read_to_string(reporter.dir().join("Test_Disk_(Write-4gb)_Average.csv")).unwrap();
        assert!(average.starts_with("Offset GB,1,2,3,4\nTest Disk,"));

        let json = fs::read_to_string(reporter.dir().join("Test_Disk_(Write-4gb)_Summary.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "Write");
        assert!(value["pctls"]["avg"].is_array());
    }

    #[test]
    fn test_empty_run_writes_nothing() {
        let temp_dir = tempdir().unwrap();
        let reporter = reporter(temp_dir.path());
        let run = analysed_run(WorkerKind::Read, 0);

        reporter.write_run(&run).unwrap();
        reporter.write_summary(&[run]).unwrap();
        assert!(!reporter.dir().exists());
    }

    #[test]
    fn test_summary_and_history() {
        let temp_dir = tempdir().unwrap();
        let history = ResultsStorage::with_path(temp_dir.path().join("results.json"));
        let reporter = reporter(temp_dir.path()).with_history(history);
        let runs = vec![analysed_run(WorkerKind::Write, 1024), analysed_run(WorkerKind::Read, 0)];

        reporter.write_summary(&runs).unwrap();

        let text = fs::read_to_string(reporter.dir().join("Test_Disk_Summary.txt")).unwrap();
        assert!(text.contains("Write test on Test Disk"));
        assert!(text.contains("avg.max: 2000.0 MB/s"));
        assert!(text.contains("not enough data"));

        let stored = ResultsStorage::with_path(temp_dir.path().join("results.json"));
        let records = stored.load_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, WorkerKind::Write);
    }

    #[test]
    fn test_history_listing() {
        assert_eq!(render_history(&[], 0), "No runs recorded yet\n");

        let run = analysed_run(WorkerKind::Read, 1024);
        let records = vec![RunRecord::from(&run), RunRecord::from(&run)];
        let text = render_history(&records, 7);

        assert!(text.starts_with("Showing 2 of 7 recorded runs\n"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().contains("Test Disk - Read - 4.0 GB"));
    }
}

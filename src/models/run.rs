//! Test run data models
//!
//! A [`TestRun`] groups everything one worker produced: the raw samples,
//! their chunked form, the typical-performance summary and run metadata.

use crate::bench::RawSeries;
use crate::stats::{aggregate, summarize, Chunk, Pctls};
use crate::{error, Result, GIB};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Which worker produced a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerKind {
    Write,
    Read,
}

impl WorkerKind {
    /// Label used in logs and report file names
    pub fn label(&self) -> &'static str {
        match self {
            WorkerKind::Write => "Write",
            WorkerKind::Read => "Read",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a worker stopped producing samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    /// All planned I/O was done
    Completed,
    /// Free space would have dropped below the safety margin
    LowDiskSpace { free_bytes: u64 },
    /// The cancellation token fired
    Cancelled,
    /// An I/O error ended the run early
    Aborted(String),
}

impl StopReason {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StopReason::Cancelled)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Completed => f.write_str("completed"),
            StopReason::LowDiskSpace { free_bytes } => write!(
                f,
                "stopped early, only {} free",
                crate::util::format_bytes(*free_bytes)
            ),
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::Aborted(msg) => write!(f, "aborted: {}", msg),
        }
    }
}

/// Identity of the device under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskIdentity {
    /// Model string supplied by configuration
    pub model: String,
    /// Directory the worker operated on
    pub root: PathBuf,
    /// Free bytes when the run was created
    pub free_space_at_start: u64,
    /// Total bytes of the device when the run was created
    pub total_space: u64,
}

impl DiskIdentity {
    pub fn new(model: impl Into<String>, root: PathBuf) -> Self {
        Self {
            model: model.into(),
            root,
            free_space_at_start: 0,
            total_space: 0,
        }
    }

    /// Model with spaces replaced, usable in file names
    pub fn file_stem(&self) -> String {
        self.model.replace(' ', "_")
    }
}

/// Everything produced by one worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub kind: WorkerKind,
    pub disk: DiskIdentity,
    /// Block size in bytes
    pub block_size: u64,
    /// Raw samples; frozen once the worker hands the run over
    #[serde(skip)]
    pub series: RawSeries,
    pub chunks: Vec<Chunk>,
    /// `None` when the series was too short or flat to summarize
    pub pctls: Option<Pctls>,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    pub stop_reason: StopReason,
    /// Files created by the write worker
    #[serde(skip)]
    pub created_files: Vec<PathBuf>,
}

impl TestRun {
    /// Create an empty run owned by a worker that is about to start
    pub fn new(kind: WorkerKind, disk: DiskIdentity, block_size: u64) -> Self {
        Self {
            kind,
            disk,
            block_size,
            series: RawSeries::new(),
            chunks: Vec::new(),
            pctls: None,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            stop_reason: StopReason::Completed,
            created_files: Vec::new(),
        }
    }

    /// Block size expressed in MB
    pub fn block_size_mb(&self) -> f64 {
        self.block_size as f64 / crate::MIB as f64
    }

    /// Volume covered by the samples in GB
    pub fn data_size_gb(&self) -> f64 {
        self.series.len() as f64 * self.block_size as f64 / GIB as f64
    }

    /// Chunk the raw series and extract the typical-performance summary
    ///
    /// A series too short or too flat to summarize leaves `pctls` empty
    /// instead of failing.
    pub fn analyze(&mut self, display_width: usize) -> Result<()> {
        self.chunks = aggregate(self.series.samples(), self.block_size_mb(), display_width);
        debug!(
            kind = %self.kind,
            samples = self.series.len(),
            chunks = self.chunks.len(),
            "Aggregated raw series"
        );

        self.pctls = match summarize(&self.chunks, self.data_size_gb()) {
            Ok(pctls) => Some(pctls),
            Err(e) if error::is_insufficient_data(&e) => {
                info!(kind = %self.kind, reason = %e, "No summary available");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(())
    }
}

/// Persisted summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: WorkerKind,
    pub disk_model: String,
    pub data_size_gb: f64,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    pub stop_reason: StopReason,
    pub pctls: Option<Pctls>,
}

impl From<&TestRun> for RunRecord {
    fn from(run: &TestRun) -> Self {
        Self {
            timestamp: run.started_at,
            kind: run.kind,
            disk_model: run.disk.model.clone(),
            data_size_gb: run.data_size_gb(),
            elapsed: run.elapsed,
            stop_reason: run.stop_reason.clone(),
            pctls: run.pctls.clone(),
        }
    }
}

impl RunRecord {
    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        let typical = self
            .pctls
            .as_ref()
            .and_then(|p| p.ranked().first().map(|pctl| pctl.value))
            .map(|v| format!("{:.1} MB/s", v))
            .unwrap_or_else(|| "no summary".to_string());

        format!(
            "{} - {} - {} - {:.1} GB - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.disk_model,
            self.kind,
            self.data_size_gb,
            typical
        )
    }
}

// Durations are stored as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(samples: &[f64]) -> TestRun {
        let mut run = TestRun::new(
            WorkerKind::Write,
            DiskIdentity::new("Test Disk", PathBuf::from("/tmp")),
            crate::MIB,
        );
        for &s in samples {
            run.series.push(s);
        }
        run
    }

    #[test]
    fn test_analyze_two_regimes() {
        let mut run = run_with(&[10.0, 10.0, 10.0, 10.0, 50.0, 50.0, 50.0, 50.0]);
        run.analyze(680).unwrap();

        assert_eq!(run.chunks.len(), 8);
        let pctls = run.pctls.expect("summary");
        let values: Vec<f64> = pctls.avg.iter().map(|p| p.value).collect();
        assert!(values.iter().any(|v| (v - 10.0).abs() < 1e-9));
        assert!(values.iter().any(|v| (v - 50.0).abs() < 1e-9));
    }

    #[test]
    fn test_analyze_empty_series_has_no_summary() {
        let mut run = run_with(&[]);
        run.analyze(680).unwrap();
        assert!(run.chunks.is_empty());
        assert!(run.pctls.is_none());
    }

    #[test]
    fn test_data_size_and_file_stem() {
        let run = run_with(&[1.0; 2048]);
        assert!((run.data_size_gb() - 2.0).abs() < 1e-9);
        assert_eq!(run.disk.file_stem(), "Test_Disk");
    }

    #[test]
    fn test_run_record_json() {
        let mut run = run_with(&[10.0, 10.0, 50.0, 50.0]);
        run.elapsed = Duration::from_millis(1500);
        run.analyze(680).unwrap();

        let record = RunRecord::from(&run);
        let json = serde_json::to_string(&record).unwrap();
        let back: RunRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.elapsed, Duration::from_millis(1500));
        assert_eq!(back.kind, WorkerKind::Write);
        assert!(back.pctls.is_some());
        assert!(back.summary().contains("Test Disk"));
    }
}

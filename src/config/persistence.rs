//! Run history persistence
//!
//! Keeps a rotating JSON history of run summaries so earlier results of a
//! device can be compared without the report directories.

use crate::models::{RunRecord, TestRun};
use crate::{Result, SlowMarkError, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const HISTORY_VERSION: u32 = 1;

/// Run history storage
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    records: Vec<RunRecord>,
}

impl ResultsStorage {
    /// Storage at the standard location
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(Self::results_file_path()?))
    }

    /// Storage backed by an explicit file
    pub fn with_path(results_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
        }
    }

    /// Standard history file: `$DATA_DIR/slowmark/results.json`
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            SlowMarkError::PersistenceError("Unable to determine data directory".to_string())
        })?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all records, oldest first
    pub fn load_records(&self) -> Result<Vec<RunRecord>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            SlowMarkError::PersistenceError(format!(
                "Failed to read results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        let file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            SlowMarkError::PersistenceError(format!(
                "Failed to parse results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        Ok(file.records)
    }

    /// Append one record, keeping only the newest [`MAX_RESULTS_HISTORY`]
    pub fn append_record(&self, record: RunRecord) -> Result<()> {
        self.append_records(std::iter::once(record))
    }

    /// Append the summary of every analysed run
    pub fn append_runs(&self, runs: &[TestRun]) -> Result<()> {
        self.append_records(runs.iter().map(RunRecord::from))
    }

    fn append_records(&self, new: impl IntoIterator<Item = RunRecord>) -> Result<()> {
        let mut records = self.load_records()?;
        records.extend(new);

        if records.len() > MAX_RESULTS_HISTORY {
            let skip_count = records.len() - MAX_RESULTS_HISTORY;
            records.drain(..skip_count);
        }

        self.save_records(records)
    }

    fn save_records(&self, records: Vec<RunRecord>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SlowMarkError::PersistenceError(format!(
                    "Failed to create results directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = ResultsFile {
            version: HISTORY_VERSION,
            records,
        };
        let content = serde_json::to_string_pretty(&file)?;

        fs::write(&self.results_path, content).map_err(|e| {
            SlowMarkError::PersistenceError(format!(
                "Failed to write results file {}: {}",
                self.results_path.display(),
                e
            ))
        })?;

        debug!(path = %self.results_path.display(), records = file.records.len(), "Saved run history");
        Ok(())
    }

    pub fn count_records(&self) -> Result<usize> {
        Ok(self.load_records()?.len())
    }

    /// Remove the history file
    pub fn clear(&self) -> Result<()> {
        if self.results_path.exists() {
            fs::remove_file(&self.results_path).map_err(|e| {
                SlowMarkError::PersistenceError(format!(
                    "Failed to remove results file {}: {}",
                    self.results_path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// The newest `count` records, oldest first
    pub fn recent_records(&self, count: usize) -> Result<Vec<RunRecord>> {
        let mut records = self.load_records()?;
        let skip_count = records.len().saturating_sub(count);
        records.drain(..skip_count);
        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.results_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StopReason, WorkerKind};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_record(data_size_gb: f64) -> RunRecord {
        RunRecord {
            timestamp: Utc::now(),
            kind: WorkerKind::Write,
            disk_model: "Test Disk".to_string(),
            data_size_gb,
            elapsed: Duration::from_secs(10),
            stop_reason: StopReason::Completed,
            pctls: None,
        }
    }

    fn storage_in(temp_dir: &TempDir) -> ResultsStorage {
        ResultsStorage {
            results_path: temp_dir.path().join("history").join("results.json"),
        }
    }

    #[test]
    fn test_load_empty_results() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);
        assert!(storage.load_records().unwrap().is_empty());
    }

    #[test]
    fn test_append_and_load_record() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        storage.append_record(create_test_record(2.0)).unwrap();

        let records = storage.load_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data_size_gb, 2.0);
        assert_eq!(records[0].elapsed, Duration::from_secs(10));
    }

    #[test]
    fn test_results_rotation() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        for i in 0..MAX_RESULTS_HISTORY + 10 {
            storage.append_record(create_test_record(i as f64)).unwrap();
        }

        let records = storage.load_records().unwrap();
        assert_eq!(records.len(), MAX_RESULTS_HISTORY);
        assert_eq!(records[0].data_size_gb, 10.0);
        assert_eq!(
            records[records.len() - 1].data_size_gb,
            (MAX_RESULTS_HISTORY + 9) as f64
        );
    }

    #[test]
    fn test_clear_and_count() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        for i in 0..3 {
            storage.append_record(create_test_record(i as f64)).unwrap();
        }
        assert_eq!(storage.count_records().unwrap(), 3);

        storage.clear().unwrap();
        assert_eq!(storage.count_records().unwrap(), 0);
    }

    #[test]
    fn test_recent_records() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);

        for i in 0..10 {
            storage.append_record(create_test_record(i as f64)).unwrap();
        }

        let recent = storage.recent_records(5).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].data_size_gb, 5.0);
        assert_eq!(recent[4].data_size_gb, 9.0);
        assert_eq!(storage.recent_records(20).unwrap().len(), 10);
    }

    #[test]
    fn test_results_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage_in(&temp_dir);
        storage.append_record(create_test_record(1.0)).unwrap();

        let content = fs::read_to_string(storage.path()).unwrap();
        let file: ResultsFile = serde_json::from_str(&content).unwrap();
        assert_eq!(file.version, HISTORY_VERSION);
        assert_eq!(file.records.len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_a_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = ResultsStorage::with_path(temp_dir.path().join("results.json"));
        fs::write(storage.path(), "not json").unwrap();

        assert!(matches!(
            storage.load_records(),
            Err(SlowMarkError::PersistenceError(_))
        ));
    }
}

//! slowmark - sustained storage throughput benchmark
//!
//! Writes and reads large files in fixed-size blocks, records one throughput
//! sample per block and condenses the resulting series into chunks and a small
//! set of "typical performance" bands (cache burst, sustained, slow tail).

use std::fmt;

pub mod bench;
pub mod config;
pub mod io;
pub mod models;
pub mod report;
pub mod stats;
pub mod util;

// Common error types
#[derive(Debug)]
pub enum SlowMarkError {
    /// I/O operation failed
    IoError(std::io::Error),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// Too few or degenerate samples to build a summary
    InsufficientData(String),
    /// Results persistence error
    PersistenceError(String),
    /// Worker management error
    WorkerError(String),
    /// Report generation error
    ReportError(String),
}

impl fmt::Display for SlowMarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlowMarkError::IoError(err) => write!(f, "I/O error: {}", err),
            SlowMarkError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            SlowMarkError::InsufficientData(msg) => write!(f, "Insufficient data: {}", msg),
            SlowMarkError::PersistenceError(msg) => write!(f, "Results persistence error: {}", msg),
            SlowMarkError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            SlowMarkError::ReportError(msg) => write!(f, "Report error: {}", msg),
        }
    }
}

impl std::error::Error for SlowMarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SlowMarkError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SlowMarkError {
    fn from(err: std::io::Error) -> Self {
        SlowMarkError::IoError(err)
    }
}

impl From<serde_json::Error> for SlowMarkError {
    fn from(err: serde_json::Error) -> Self {
        SlowMarkError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for SlowMarkError {
    fn from(err: toml::de::Error) -> Self {
        SlowMarkError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for SlowMarkError {
    fn from(err: toml::ser::Error) -> Self {
        SlowMarkError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for slowmark operations
pub type Result<T> = std::result::Result<T, SlowMarkError>;

/// Error handling utilities
pub mod error {
    use super::SlowMarkError;

    /// Whether the error only means "no summary available" rather than a failure
    pub fn is_insufficient_data(error: &SlowMarkError) -> bool {
        matches!(error, SlowMarkError::InsufficientData(_))
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &SlowMarkError) -> String {
        match error {
            SlowMarkError::IoError(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                "Permission denied. Check permissions of the target directory.".to_string()
            }
            SlowMarkError::InsufficientData(_) => {
                "Not enough samples to summarize. Run a longer test.".to_string()
            }
            SlowMarkError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            SlowMarkError::PersistenceError(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            SlowMarkError::ReportError(msg) => {
                format!("Failed to write report: {}", msg)
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "slowmark";
pub const CONFIG_FILE: &str = "slowmark.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const MAX_RESULTS_HISTORY: usize = 100;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Free space that must remain on the device after writing a file
pub const FREE_SPACE_MARGIN: u64 = GIB;

/// Prefix/suffix of the files produced by the write worker
pub const DATA_FILE_PREFIX: &str = "file-";
pub const DATA_FILE_SUFFIX: &str = ".bin";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: SlowMarkError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, SlowMarkError::IoError(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_insufficient_data_is_distinguished() {
        let err = SlowMarkError::InsufficientData("1 chunk".into());
        assert!(error::is_insufficient_data(&err));
        assert!(!error::is_insufficient_data(&SlowMarkError::WorkerError("x".into())));
        assert!(error::user_friendly_message(&err).contains("Not enough samples"));
    }
}

//! Configuration management module
//!
//! Handles loading, saving, and validation of benchmark configuration.

use crate::{Result, SlowMarkError, APP_NAME, CONFIG_FILE, GIB, MIB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod persistence;

pub const MIN_BLOCK_SIZE: u64 = 4096;
pub const MAX_BLOCK_SIZE: u64 = GIB;
pub const MAX_FILE_SIZE_MB: u64 = 32 * 1024;
pub const MAX_FILE_COUNT: u32 = 10_000;

/// Benchmark configuration structure containing all test parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Which workers to run
    pub test: TestKind,
    /// Block size for I/O operations (in bytes)
    pub block_size: u64,
    /// Size of each written file (in MB)
    pub file_size_mb: u64,
    /// Number of files the write worker creates
    pub file_count: u32,
    /// Directory the write worker fills
    pub write_dir: PathBuf,
    /// Directory tree the read worker walks
    pub read_dir: PathBuf,
    /// Base directory for report output
    pub report_dir: PathBuf,
    /// Chart width in pixels; bounds the chunk count together with padding
    pub image_width: u32,
    /// Chart padding in pixels on each side
    pub image_padding: u32,
    /// Model string of the device under test
    pub disk_model: String,
    /// Keep the written files after a read+write run
    pub keep_files: bool,
}

/// Test kind selecting the active workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestKind {
    #[serde(rename = "r")]
    Read,
    #[serde(rename = "w")]
    Write,
    #[serde(rename = "rw")]
    ReadWrite,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            test: TestKind::ReadWrite,
            block_size: 4 * MIB,
            file_size_mb: 1024,
            file_count: 50,
            write_dir: PathBuf::from("_data"),
            read_dir: PathBuf::from("_data"),
            report_dir: PathBuf::from("."),
            image_width: 800,
            image_padding: 60,
            disk_model: "Unknown Model".to_string(),
            keep_files: false,
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err(SlowMarkError::ConfigError(format!(
                "Block size must be between {} and {} bytes, got {}",
                MIN_BLOCK_SIZE, MAX_BLOCK_SIZE, self.block_size
            )));
        }

        if self.file_size_mb < 1 || self.file_size_mb > MAX_FILE_SIZE_MB {
            return Err(SlowMarkError::ConfigError(format!(
                "File size must be between 1 and {} MB, got {}",
                MAX_FILE_SIZE_MB, self.file_size_mb
            )));
        }

        if self.file_count < 1 || self.file_count > MAX_FILE_COUNT {
            return Err(SlowMarkError::ConfigError(format!(
                "File count must be between 1 and {}, got {}",
                MAX_FILE_COUNT, self.file_count
            )));
        }

        if self.display_width() == 0 {
            return Err(SlowMarkError::ConfigError(format!(
                "Image width {} leaves no room after padding {}",
                self.image_width, self.image_padding
            )));
        }

        if self.test.includes_write() && self.write_dir.exists() && !self.write_dir.is_dir() {
            return Err(SlowMarkError::ConfigError(format!(
                "Write path is not a directory: {}",
                self.write_dir.display()
            )));
        }

        // In rw mode the writer creates the read directory itself
        if self.test == TestKind::Read && !self.read_dir.is_dir() {
            return Err(SlowMarkError::ConfigError(format!(
                "Read path does not exist or is not a directory: {}",
                self.read_dir.display()
            )));
        }

        Ok(())
    }

    /// Bytes written per file
    pub fn file_bytes(&self) -> u64 {
        self.file_size_mb * MIB
    }

    /// Block size expressed in MB
    pub fn block_size_mb(&self) -> f64 {
        self.block_size as f64 / MIB as f64
    }

    /// Directory the read worker walks; a read+write run reads back what it wrote
    pub fn effective_read_dir(&self) -> &Path {
        match self.test {
            TestKind::ReadWrite => &self.write_dir,
            _ => &self.read_dir,
        }
    }

    /// Maximum number of chunks a series is reduced to
    pub fn display_width(&self) -> usize {
        self.image_width.saturating_sub(self.image_padding.saturating_mul(2)) as usize
    }

    /// Set the test kind
    pub fn with_test(mut self, test: TestKind) -> Self {
        self.test = test;
        self
    }

    /// Set the block size for I/O operations
    pub fn with_block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Set the size of each written file in MB
    pub fn with_file_size_mb(mut self, size_mb: u64) -> Self {
        self.file_size_mb = size_mb;
        self
    }

    /// Set the number of written files
    pub fn with_file_count(mut self, count: u32) -> Self {
        self.file_count = count;
        self
    }

    /// Use one directory for both writing and reading
    pub fn with_data_dir(mut self, path: PathBuf) -> Self {
        self.write_dir = path.clone();
        self.read_dir = path;
        self
    }

    /// Set the directory the write worker fills
    pub fn with_write_dir(mut self, path: PathBuf) -> Self {
        self.write_dir = path;
        self
    }

    /// Set the directory tree the read worker walks
    pub fn with_read_dir(mut self, path: PathBuf) -> Self {
        self.read_dir = path;
        self
    }

    /// Set the report base directory
    pub fn with_report_dir(mut self, path: PathBuf) -> Self {
        self.report_dir = path;
        self
    }

    /// Set image width and padding, which bound the chunk count
    pub fn with_image_size(mut self, width: u32, padding: u32) -> Self {
        self.image_width = width;
        self.image_padding = padding;
        self
    }

    /// Set the disk model string
    pub fn with_disk_model(mut self, model: impl Into<String>) -> Self {
        self.disk_model = model.into();
        self
    }

    /// Set whether written files survive a read+write run
    pub fn with_keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load configuration from a specific file, defaulting when it is absent
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| {
            SlowMarkError::ConfigError(format!(
                "Failed to read config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SlowMarkError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(config_path, content).map_err(|e| {
            SlowMarkError::ConfigError(format!(
                "Failed to write config file {}: {}",
                config_path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Save configuration to the standard config file location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/slowmark/slowmark.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            SlowMarkError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

impl TestKind {
    pub fn includes_write(&self) -> bool {
        matches!(self, TestKind::Write | TestKind::ReadWrite)
    }

    pub fn includes_read(&self) -> bool {
        matches!(self, TestKind::Read | TestKind::ReadWrite)
    }

    /// Short form used on the command line and in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Read => "r",
            TestKind::Write => "w",
            TestKind::ReadWrite => "rw",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = SlowMarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "r" => Ok(TestKind::Read),
            "w" => Ok(TestKind::Write),
            "rw" => Ok(TestKind::ReadWrite),
            other => Err(SlowMarkError::ConfigError(format!(
                "Unsupported test: {} (expected r, w or rw)",
                other
            ))),
        }
    }
}

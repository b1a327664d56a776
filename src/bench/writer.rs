//! Write worker
//!
//! Fills the target directory with `file_count` files of `file_size_mb`
//! each, one synced block at a time, timing every block.

use crate::bench::{CancelToken, ProgressReporter};
use crate::config::BenchmarkConfig;
use crate::io::DiskIO;
use crate::models::{StopReason, TestRun};
use crate::util::block_throughput_mbps;
use crate::{DATA_FILE_PREFIX, DATA_FILE_SUFFIX, FREE_SPACE_MARGIN};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parameters of one write pass
#[derive(Debug, Clone)]
pub struct WriteJob {
    pub dir: PathBuf,
    pub block_size: u64,
    pub file_bytes: u64,
    pub file_count: u32,
}

impl WriteJob {
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self {
            dir: config.write_dir.clone(),
            block_size: config.block_size,
            file_bytes: config.file_bytes(),
            file_count: config.file_count,
        }
    }

    /// Full blocks written per file; a partial tail rounds up to a whole block
    pub fn blocks_per_file(&self) -> u64 {
        self.file_bytes.div_ceil(self.block_size)
    }

    /// Bytes the pass writes if it is not stopped early
    pub fn planned_bytes(&self) -> u64 {
        self.blocks_per_file() * self.block_size * u64::from(self.file_count)
    }
}

/// Name of the `index`-th data file
pub fn data_file_name(index: u32) -> String {
    format!("{}{:06}{}", DATA_FILE_PREFIX, index, DATA_FILE_SUFFIX)
}

/// Whether `name` looks like a file produced by the write worker
pub fn is_data_file(name: &str) -> bool {
    name.strip_prefix(DATA_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(DATA_FILE_SUFFIX))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Delete data files left behind by an earlier run
///
/// Returns how many files were removed.
pub fn remove_leftovers(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_leftover = path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_data_file);
        if !is_leftover {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove leftover file"),
        }
    }
    removed
}

/// Run the write loop, appending one sample per block to `run.series`
pub fn run_write(
    job: &WriteJob,
    run: &mut TestRun,
    disk_io: &dyn DiskIO,
    cancel: &CancelToken,
    progress: &mut ProgressReporter,
) -> StopReason {
    if let Err(e) = fs::create_dir_all(&job.dir) {
        return StopReason::Aborted(format!("cannot create {}: {}", job.dir.display(), e));
    }

    let removed = remove_leftovers(&job.dir);
    if removed > 0 {
        info!(dir = %job.dir.display(), removed, "Removed leftover data files");
    }

    let mut buffer = vec![0u8; job.block_size as usize];
    SmallRng::from_entropy().fill_bytes(&mut buffer);
    let blocks_per_file = job.blocks_per_file();

    for index in 1..=job.file_count {
        if cancel.is_cancelled() {
            return StopReason::Cancelled;
        }

        let free_bytes = match disk_io.free_space(&job.dir) {
            Ok(free) => free,
            Err(e) => return StopReason::Aborted(format!("free space query failed: {}", e)),
        };
        if free_bytes.saturating_sub(job.file_bytes) < FREE_SPACE_MARGIN {
            warn!(free_bytes, file_bytes = job.file_bytes, "Stopping, device nearly full");
            return StopReason::LowDiskSpace { free_bytes };
        }

        let path = job.dir.join(data_file_name(index));
        let mut file = match disk_io.open_write(&path) {
            Ok(file) => file,
            Err(e) => {
                return StopReason::Aborted(format!("cannot create {}: {}", path.display(), e))
            }
        };
        run.created_files.push(path.clone());
        debug!(file = %path.display(), blocks = blocks_per_file, "Writing file");

        for _ in 0..blocks_per_file {
            if cancel.is_cancelled() {
                progress.flush(index as usize);
                return StopReason::Cancelled;
            }

            let started = Instant::now();
            if let Err(e) = file.write_block(&buffer) {
                warn!(file = %path.display(), error = %e, "Write failed");
                return StopReason::Aborted(format!("write to {} failed: {}", path.display(), e));
            }
            let mbps = block_throughput_mbps(job.block_size, started.elapsed());

            run.series.push(mbps);
            progress.record(index as usize, job.block_size, mbps);
        }
    }

    progress.flush(job.file_count as usize);
    StopReason::Completed
}

//! Read worker
//!
//! Walks a directory tree and reads every large enough file in full
//! blocks, timing each block.

use crate::bench::{CancelToken, ProgressReporter};
use crate::io::DiskIO;
use crate::models::{StopReason, TestRun};
use crate::util::block_throughput_mbps;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parameters of one read pass
#[derive(Debug, Clone)]
pub struct ReadJob {
    pub dir: PathBuf,
    pub block_size: u64,
}

/// A file selected for reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadTarget {
    pub path: PathBuf,
    pub size: u64,
}

impl ReadTarget {
    /// Full blocks that fit in the file
    pub fn blocks(&self, block_size: u64) -> u64 {
        self.size / block_size
    }
}

/// Regular files under `dir` of at least `min_size` bytes, in sorted walk order
///
/// Unreadable directories and entries are skipped. Symbolic links are not
/// followed.
pub fn collect_files(dir: &Path, min_size: u64) -> Vec<ReadTarget> {
    let mut targets = Vec::new();
    walk(dir, min_size, &mut targets);
    targets
}

fn walk(dir: &Path, min_size: u64, targets: &mut Vec<ReadTarget>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_dir() => walk(&path, min_size, targets),
            Ok(meta) if meta.is_file() && meta.len() >= min_size => targets.push(ReadTarget {
                size: meta.len(),
                path,
            }),
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping entry"),
        }
    }
}

/// Run the read loop, appending one sample per block to `run.series`
pub fn run_read(
    job: &ReadJob,
    run: &mut TestRun,
    disk_io: &dyn DiskIO,
    cancel: &CancelToken,
    progress: &mut ProgressReporter,
) -> StopReason {
    let targets = collect_files(&job.dir, job.block_size);
    let total: u64 = targets.iter().map(|t| t.blocks(job.block_size) * job.block_size).sum();
    progress.set_total_bytes(total);
    info!(dir = %job.dir.display(), files = targets.len(), total_bytes = total, "Read targets collected");

    let mut buffer = vec![0u8; job.block_size as usize];

    for (i, target) in targets.iter().enumerate() {
        if cancel.is_cancelled() {
            return StopReason::Cancelled;
        }

        let mut file = match disk_io.open_read(&target.path) {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %target.path.display(), error = %e, "Skipping unreadable file");
                continue;
            }
        };

        for _ in 0..target.blocks(job.block_size) {
            if cancel.is_cancelled() {
                progress.flush(i + 1);
                return StopReason::Cancelled;
            }

            let started = Instant::now();
            if let Err(e) = file.read_block(&mut buffer) {
                warn!(path = %target.path.display(), error = %e, "Read failed, skipping rest of file");
                break;
            }
            let mbps = block_throughput_mbps(job.block_size, started.elapsed());

            run.series.push(mbps);
            progress.record(i + 1, job.block_size, mbps);
        }
    }

    progress.flush(targets.len());
    StopReason::Completed
}

//! Run coordination
//!
//! A [`RunSession`] is the explicit context of one benchmark invocation: it
//! starts the workers the configuration asks for, orders read after write,
//! carries the shared cancellation token and finalizes at most once.

use crate::bench::reader::{run_read, ReadJob};
use crate::bench::worker::{spawn_worker, wait_terminal};
use crate::bench::writer::{run_write, WriteJob};
use crate::bench::{CancelToken, ProgressReporter, ProgressUpdate, WorkerHandle, WorkerState};
use crate::config::{BenchmarkConfig, TestKind};
use crate::io::{DiskIO, SharedDiskIO};
use crate::models::{DiskIdentity, TestRun, WorkerKind};
use crate::report::ReportSink;
use crate::{Result, SlowMarkError};
use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, watch, Mutex, OnceCell};
use tracing::{debug, info, warn};

/// At-most-once gate around an async step
///
/// The first caller runs the step; concurrent and later callers wait for it
/// and observe its stored outcome. If the caller running the step drops its
/// future, the next caller starts the step again, so a step must be
/// resumable up to its last await point.
#[derive(Debug)]
pub struct Finalizer<T> {
    cell: OnceCell<T>,
    executions: AtomicUsize,
}

impl<T> Finalizer<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            executions: AtomicUsize::new(0),
        }
    }

    pub async fn run_once<F, Fut>(&self, step: F) -> &T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let executions = &self.executions;
        self.cell
            .get_or_init(move || async move {
                let outcome = step().await;
                executions.fetch_add(1, Ordering::SeqCst);
                outcome
            })
            .await
    }

    /// Outcome of the step, once it completed
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// How many times the step ran to completion
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl<T> Default for Finalizer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What finalization produced
#[derive(Debug)]
pub struct FinalizeOutcome {
    /// Analysed runs in worker start order
    pub runs: Vec<TestRun>,
    /// First reporting failure, if any
    pub report_error: Option<String>,
}

/// One benchmark invocation
pub struct RunSession {
    config: BenchmarkConfig,
    cancel: CancelToken,
    states: Vec<(WorkerKind, watch::Receiver<WorkerState>)>,
    workers: Mutex<Vec<WorkerHandle>>,
    finalizer: Finalizer<FinalizeOutcome>,
}

impl RunSession {
    /// Validate the configuration and start the requested workers
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: BenchmarkConfig,
        disk_io: SharedDiskIO,
        cancel: CancelToken,
        progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            test = %config.test,
            block_size = config.block_size,
            file_size_mb = config.file_size_mb,
            file_count = config.file_count,
            "Starting run session"
        );

        let mut workers = Vec::new();
        let mut writer_state = None;

        if config.test.includes_write() {
            let job = WriteJob::from_config(&config);
            let run = TestRun::new(
                WorkerKind::Write,
                probe_disk(disk_io.as_ref(), &config.disk_model, &job.dir),
                config.block_size,
            );
            let (disk_io, token, tx) = (disk_io.clone(), cancel.clone(), progress_tx.clone());

            let handle = spawn_worker(run, None, cancel.clone(), move |run| {
                let mut progress =
                    ProgressReporter::new(WorkerKind::Write, tx, Some(job.planned_bytes()));
                run_write(&job, run, disk_io.as_ref(), &token, &mut progress)
            });
            writer_state = Some(handle.subscribe());
            workers.push(handle);
        }

        if config.test.includes_read() {
            let job = ReadJob {
                dir: config.effective_read_dir().to_path_buf(),
                block_size: config.block_size,
            };
            let run = TestRun::new(
                WorkerKind::Read,
                probe_disk(disk_io.as_ref(), &config.disk_model, &job.dir),
                config.block_size,
            );
            let (disk_io, token, tx) = (disk_io.clone(), cancel.clone(), progress_tx.clone());

            let handle = spawn_worker(run, writer_state, cancel.clone(), move |run| {
                let mut progress = ProgressReporter::new(WorkerKind::Read, tx, None);
                run_read(&job, run, disk_io.as_ref(), &token, &mut progress)
            });
            workers.push(handle);
        }

        let states = workers.iter().map(|w| (w.kind(), w.subscribe())).collect();

        Ok(Self {
            config,
            cancel,
            states,
            workers: Mutex::new(workers),
            finalizer: Finalizer::new(),
        })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Raise the shared cancellation flag
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("Cancellation requested");
        }
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current lifecycle state of every worker
    pub fn states(&self) -> Vec<(WorkerKind, WorkerState)> {
        self.states
            .iter()
            .map(|(kind, rx)| (*kind, rx.borrow().clone()))
            .collect()
    }

    /// Resolve once every worker is in a terminal state
    pub async fn wait_finished(&self) {
        for (kind, rx) in &self.states {
            let state = wait_terminal(rx.clone()).await;
            debug!(kind = %kind, ?state, "Worker terminal");
        }
    }

    /// Join the workers, analyse their runs and report them, at most once
    ///
    /// Callers racing with each other (normal completion against a shutdown
    /// signal) all wait for the same single execution. Dropping a pending
    /// call is safe: worker results stay in their handles until every worker
    /// has settled, and reporting happens without further await points.
    pub async fn finalize(&self, sink: &dyn ReportSink) -> Result<&[TestRun]> {
        let outcome = self.finalizer.run_once(|| self.finalize_inner(sink)).await;
        match &outcome.report_error {
            Some(msg) => Err(SlowMarkError::ReportError(msg.clone())),
            None => Ok(&outcome.runs),
        }
    }

    /// Runs of a completed finalization
    pub fn runs(&self) -> Option<&[TestRun]> {
        self.finalizer.get().map(|o| o.runs.as_slice())
    }

    /// How many times finalization ran to completion
    pub fn finalize_count(&self) -> usize {
        self.finalizer.executions()
    }

    async fn finalize_inner(&self, sink: &dyn ReportSink) -> FinalizeOutcome {
        let outcomes: Vec<Result<TestRun>> = {
            let mut handles = self.workers.lock().await;
            info!(workers = handles.len(), cancelled = self.cancel.is_cancelled(), "Finalizing");
            for handle in handles.iter_mut() {
                handle.settle().await;
            }
            handles.iter_mut().filter_map(WorkerHandle::take_outcome).collect()
        };

        let mut runs = Vec::with_capacity(outcomes.len());
        let mut report_error = None;

        for outcome in outcomes {
            match outcome {
                Ok(run) => runs.push(run),
                Err(e) => {
                    warn!(error = %e, "Worker produced no run");
                    report_error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let display_width = self.config.display_width();
        for run in &mut runs {
            if let Err(e) = run.analyze(display_width) {
                warn!(kind = %run.kind, error = %e, "Analysis failed");
                report_error.get_or_insert_with(|| e.to_string());
            }
        }

        for run in &runs {
            if let Err(e) = sink.write_run(run) {
                warn!(kind = %run.kind, error = %e, "Could not report run");
                report_error.get_or_insert_with(|| e.to_string());
            }
        }
        if let Err(e) = sink.write_summary(&runs) {
            warn!(error = %e, "Could not write summary");
            report_error.get_or_insert_with(|| e.to_string());
        }

        if self.config.test == TestKind::ReadWrite && !self.config.keep_files {
            remove_created_files(&runs);
        }

        FinalizeOutcome { runs, report_error }
    }
}

/// Disk identity with free/total space of the device holding `root`
///
/// `root` may not exist yet, so the nearest existing ancestor is queried.
fn probe_disk(disk_io: &dyn DiskIO, model: &str, root: &Path) -> DiskIdentity {
    let mut disk = DiskIdentity::new(model, root.to_path_buf());
    let Some(existing) = root.ancestors().find(|p| p.exists()) else {
        return disk;
    };
    let existing = if existing.as_os_str().is_empty() {
        Path::new(".")
    } else {
        existing
    };

    disk.free_space_at_start = disk_io.free_space(existing).unwrap_or(0);
    disk.total_space = disk_io.total_space(existing).unwrap_or(0);
    disk
}

fn remove_created_files(runs: &[TestRun]) {
    let mut removed = 0usize;
    for path in runs.iter().flat_map(|r| &r.created_files) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove data file"),
        }
    }
    info!(removed, "Removed data files");
}

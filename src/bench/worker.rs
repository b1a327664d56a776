//! Benchmark worker lifecycle
//!
//! Every worker owns one [`TestRun`] and runs its I/O loop on the blocking
//! pool. Its lifecycle is published through a watch channel so the
//! coordinator and a gated read worker can await terminal states instead of
//! polling flags.

use crate::bench::CancelToken;
use crate::models::{StopReason, TestRun, WorkerKind};
use crate::{Result, SlowMarkError};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Interval between two progress updates of one worker
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Per-block throughput samples of one worker, in production order
#[derive(Debug, Clone, Default)]
pub struct RawSeries {
    samples: Vec<f64>,
}

impl RawSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mbps: f64) {
        self.samples.push(mbps);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

impl FromIterator<f64> for RawSeries {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

/// Worker lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerState {
    /// Spawned, waiting for its turn
    Idle,
    /// I/O loop active
    Running,
    /// Stopped on its own
    Finished(StopReason),
    /// Stopped because the cancellation token fired
    Cancelled,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Finished(_) | WorkerState::Cancelled)
    }
}

impl From<&StopReason> for WorkerState {
    fn from(reason: &StopReason) -> Self {
        match reason {
            StopReason::Cancelled => WorkerState::Cancelled,
            other => WorkerState::Finished(other.clone()),
        }
    }
}

/// Progress update sent during benchmark execution
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub kind: WorkerKind,
    /// 1-based index of the file in progress
    pub file_index: usize,
    pub blocks_done: u64,
    pub bytes_done: u64,
    /// Planned bytes, when known up front
    pub total_bytes: Option<u64>,
    pub current_mbps: f64,
    pub min_mbps: f64,
    pub max_mbps: f64,
    pub elapsed: Duration,
}

impl ProgressUpdate {
    /// Calculate completion percentage (0.0 to 1.0), if the total is known
    pub fn completion(&self) -> Option<f64> {
        self.total_bytes
            .filter(|&total| total > 0)
            .map(|total| (self.bytes_done as f64 / total as f64).min(1.0))
    }
}

/// Throttled progress publisher used inside the blocking I/O loops
///
/// Sends with `try_send` so a slow consumer never stalls the I/O.
pub struct ProgressReporter {
    kind: WorkerKind,
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    total_bytes: Option<u64>,
    started: Instant,
    last_sent: Option<Instant>,
    blocks_done: u64,
    bytes_done: u64,
    min_mbps: f64,
    max_mbps: f64,
}

impl ProgressReporter {
    pub fn new(
        kind: WorkerKind,
        tx: Option<mpsc::Sender<ProgressUpdate>>,
        total_bytes: Option<u64>,
    ) -> Self {
        Self {
            kind,
            tx,
            total_bytes,
            started: Instant::now(),
            last_sent: None,
            blocks_done: 0,
            bytes_done: 0,
            min_mbps: f64::INFINITY,
            max_mbps: 0.0,
        }
    }

    /// Set the planned volume once it is known
    pub fn set_total_bytes(&mut self, total_bytes: u64) {
        self.total_bytes = Some(total_bytes);
    }

    /// Account for one finished block
    pub fn record(&mut self, file_index: usize, block_bytes: u64, mbps: f64) {
        self.blocks_done += 1;
        self.bytes_done += block_bytes;
        self.min_mbps = self.min_mbps.min(mbps);
        self.max_mbps = self.max_mbps.max(mbps);

        let due = self
            .last_sent
            .map_or(true, |t| t.elapsed() >= PROGRESS_INTERVAL);
        if due {
            self.send(file_index, mbps);
        }
    }

    /// Send the final state regardless of the interval
    pub fn flush(&mut self, file_index: usize) {
        self.send(file_index, 0.0);
    }

    fn send(&mut self, file_index: usize, current_mbps: f64) {
        let Some(tx) = &self.tx else { return };

        let update = ProgressUpdate {
            kind: self.kind,
            file_index,
            blocks_done: self.blocks_done,
            bytes_done: self.bytes_done,
            total_bytes: self.total_bytes,
            current_mbps,
            min_mbps: if self.blocks_done == 0 { 0.0 } else { self.min_mbps },
            max_mbps: self.max_mbps,
            elapsed: self.started.elapsed(),
        };
        // a full or closed channel just drops this update
        let _ = tx.try_send(update);
        self.last_sent = Some(Instant::now());
    }
}

/// Handle to a spawned worker
#[derive(Debug)]
pub struct WorkerHandle {
    kind: WorkerKind,
    state: watch::Receiver<WorkerState>,
    join: JoinHandle<Result<TestRun>>,
    outcome: Option<Result<TestRun>>,
}

impl WorkerHandle {
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.state.borrow().clone()
    }

    /// Receiver following this worker's lifecycle
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    /// Resolve once the worker reached a terminal state
    pub async fn wait_terminal(&self) -> WorkerState {
        wait_terminal(self.state.clone()).await
    }

    /// Wait for the worker task and keep its result in the handle
    ///
    /// Dropping the returned future loses nothing: the task keeps running
    /// and a later call resumes the wait.
    pub async fn settle(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        let joined = (&mut self.join).await;
        let kind = self.kind;
        self.outcome = Some(joined.unwrap_or_else(|e| {
            Err(SlowMarkError::WorkerError(format!("{} worker task failed: {}", kind, e)))
        }));
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Take the result of a settled worker
    pub fn take_outcome(&mut self) -> Option<Result<TestRun>> {
        self.outcome.take()
    }

    /// Wait for the worker task and take its run
    pub async fn join(mut self) -> Result<TestRun> {
        self.settle().await;
        self.outcome.take().unwrap_or_else(|| {
            Err(SlowMarkError::WorkerError(format!("{} worker result already taken", self.kind)))
        })
    }
}

/// Await a terminal state on a lifecycle receiver
///
/// A dropped sender ends the wait with the last published state.
pub async fn wait_terminal(mut rx: watch::Receiver<WorkerState>) -> WorkerState {
    let terminal = rx.wait_for(WorkerState::is_terminal).await.map(|s| s.clone());
    terminal.unwrap_or_else(|_| rx.borrow().clone())
}

/// Spawn a worker around a blocking I/O loop
///
/// With a `gate`, the loop only starts once the gated worker is terminal;
/// if `cancel` fires first the run is handed back empty as cancelled.
/// The loop returns why it stopped and fills `run.series` as it goes.
pub fn spawn_worker<F>(
    mut run: TestRun,
    gate: Option<watch::Receiver<WorkerState>>,
    cancel: CancelToken,
    body: F,
) -> WorkerHandle
where
    F: FnOnce(&mut TestRun) -> StopReason + Send + 'static,
{
    let kind = run.kind;
    let (state_tx, state_rx) = watch::channel(WorkerState::Idle);

    let join = tokio::spawn(async move {
        if let Some(gate) = gate {
            debug!(kind = %kind, "Waiting for the preceding worker");
            let proceed = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                state = wait_terminal(gate) => {
                    debug!(kind = %kind, ?state, "Preceding worker done");
                    true
                }
            };

            if !proceed {
                info!(kind = %kind, "Cancelled before start");
                run.stop_reason = StopReason::Cancelled;
                state_tx.send_replace(WorkerState::Cancelled);
                return Ok(run);
            }
        }

        run.started_at = Utc::now();
        state_tx.send_replace(WorkerState::Running);
        info!(kind = %kind, root = %run.disk.root.display(), "Worker started");

        let joined = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let reason = body(&mut run);
            run.elapsed = started.elapsed();
            run.stop_reason = reason;
            run
        })
        .await;

        match joined {
            Ok(run) => {
                info!(
                    kind = %kind,
                    samples = run.series.len(),
                    elapsed_ms = run.elapsed.as_millis() as u64,
                    reason = ?run.stop_reason,
                    "Worker stopped"
                );
                state_tx.send_replace(WorkerState::from(&run.stop_reason));
                Ok(run)
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Worker I/O loop failed");
                state_tx.send_replace(WorkerState::Finished(StopReason::Aborted(e.to_string())));
                Err(SlowMarkError::WorkerError(format!("{} worker panicked: {}", kind, e)))
            }
        }
    });

    WorkerHandle {
        kind,
        state: state_rx,
        join,
        outcome: None,
    }
}

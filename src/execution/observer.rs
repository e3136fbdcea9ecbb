use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Progress events emitted while a batch of rows is decoded.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    BatchStarted { rows: usize, chunks: usize },
    /// A window of at most `max_in_flight_chunks` chunks is handed to the pool.
    WindowStarted { first_row: usize, chunks: usize },
    ChunkStarted { first_row: usize, rows: usize },
    ChunkFinished { first_row: usize, decoded: usize, failed: usize },
    BatchFinished {
        elapsed: Duration,
        /// Set when a failure ended the batch before every window ran.
        stopped_early: bool,
        metrics: ExecutionMetricsSnapshot,
    },
}

pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Logs execution events through `tracing`.
///
/// Per-chunk events go to `trace`, batch boundaries to `debug`.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::BatchStarted { rows, chunks } => {
                tracing::debug!(rows, chunks, "decode batch started");
            }
            ExecutionEvent::BatchFinished {
                elapsed,
                stopped_early,
                metrics,
            } => {
                tracing::debug!(?elapsed, stopped_early, %metrics, "decode batch finished");
            }
            other => tracing::trace!(event = ?other, "decode progress"),
        }
    }
}

/// Live counters for the most recent batch.
///
/// Counters reset when a batch starts. Callers can snapshot them at any time.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    batches: AtomicU64,
    rows_decoded: AtomicU64,
    rows_failed: AtomicU64,
    chunks_finished: AtomicU64,
    windows: AtomicU64,
    active_chunks: AtomicUsize,
    peak_active_chunks: AtomicUsize,
    elapsed_us: AtomicU64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        for counter in [
            &self.rows_decoded,
            &self.rows_failed,
            &self.chunks_finished,
            &self.windows,
            &self.elapsed_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.active_chunks.store(0, Ordering::Relaxed);
        self.peak_active_chunks.store(0, Ordering::Relaxed);
    }

    pub(crate) fn window_started(&self) {
        self.windows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn chunk_started(&self) {
        let active = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active_chunks.fetch_max(active, Ordering::SeqCst);
    }

    pub(crate) fn chunk_finished(&self, decoded: usize, failed: usize) {
        self.rows_decoded.fetch_add(decoded as u64, Ordering::Relaxed);
        self.rows_failed.fetch_add(failed as u64, Ordering::Relaxed);
        self.chunks_finished.fetch_add(1, Ordering::Relaxed);
        self.active_chunks.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn finish(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.elapsed_us.store(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        ExecutionMetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            rows_decoded: self.rows_decoded.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            chunks_finished: self.chunks_finished.load(Ordering::Relaxed),
            windows: self.windows.load(Ordering::Relaxed),
            peak_active_chunks: self.peak_active_chunks.load(Ordering::SeqCst),
            elapsed: Duration::from_micros(self.elapsed_us.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time copy of [`ExecutionMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionMetricsSnapshot {
    /// Batches started since the engine was built.
    pub batches: u64,
    pub rows_decoded: u64,
    pub rows_failed: u64,
    pub chunks_finished: u64,
    pub windows: u64,
    pub peak_active_chunks: usize,
    /// Zero while a batch is still running.
    pub elapsed: Duration,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decoded={} failed={} chunks={} windows={} peak_active={} elapsed={:?}",
            self.rows_decoded,
            self.rows_failed,
            self.chunks_finished,
            self.windows,
            self.peak_active_chunks,
            self.elapsed
        )
    }
}

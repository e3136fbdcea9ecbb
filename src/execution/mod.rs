//! Parallel record decoding.
//!
//! Parsing decodes rows one at a time by default. When
//! [`crate::ingestion::IngestionOptions::execution`] is set, each sheet's mapped rows are
//! handed to an [`ExecutionEngine`] instead. The engine splits them into chunks and decodes
//! windows of up to `max_in_flight_chunks` chunks at a time on its own rayon pool.
//!
//! Results come back in input order. A window that contains a failure is the last one
//! decoded, and the returned results end at the first failing row, so callers see the
//! same prefix a sequential run would have produced.

mod observer;

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::de::DeserializeOwned;

use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::decode::decode_mapped_row;
use crate::ingestion::mapper::MappedRow;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, TracingExecutionObserver,
};

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Worker threads. `None` uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Chunks decoded concurrently; also the size of one window.
    pub max_in_flight_chunks: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = available_threads();
        Self {
            num_threads: None,
            chunk_size: 1_024,
            max_in_flight_chunks: n,
        }
    }
}

fn available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Decodes mapped rows on a dedicated thread pool.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Fails with [`IngestionError::Execution`] on zero sizes or if the pool cannot be built.
    pub fn new(opts: ExecutionOptions) -> IngestionResult<Self> {
        if opts.chunk_size == 0 {
            return Err(execution_error("chunk_size must be > 0".to_string()));
        }
        if opts.max_in_flight_chunks == 0 {
            return Err(execution_error("max_in_flight_chunks must be > 0".to_string()));
        }
        if opts.num_threads == Some(0) {
            return Err(execution_error("num_threads must be > 0 when set".to_string()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(opts.num_threads.unwrap_or_else(available_threads))
            .thread_name(|i| format!("sheet-decode-{i}"))
            .build()
            .map_err(|e| execution_error(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Shared handle to the live counters.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Decode `rows` into `T`, preserving order.
    ///
    /// The result holds one entry per row up to and including the first failure; rows
    /// after it are not returned.
    pub fn decode_rows<T>(&self, rows: Vec<MappedRow>) -> Vec<IngestionResult<T>>
    where
        T: DeserializeOwned + Send,
    {
        let started = Instant::now();
        let total = rows.len();
        let chunks = into_chunks(rows, self.opts.chunk_size);

        self.metrics.reset();
        self.emit(|| ExecutionEvent::BatchStarted {
            rows: total,
            chunks: chunks.len(),
        });

        let mut out: Vec<IngestionResult<T>> = Vec::with_capacity(total);
        let mut stopped_early = false;
        let mut pending = chunks.into_iter().peekable();

        while pending.peek().is_some() {
            let window: Vec<(usize, Vec<MappedRow>)> = pending.by_ref().take(self.opts.max_in_flight_chunks).collect();
            self.metrics.window_started();
            self.emit(|| ExecutionEvent::WindowStarted {
                first_row: window[0].0,
                chunks: window.len(),
            });

            let decoded: Vec<Vec<IngestionResult<T>>> = self.pool.install(|| {
                window
                    .into_par_iter()
                    .map(|(first_row, chunk)| self.decode_chunk(first_row, chunk))
                    .collect()
            });

            if let Some(failed_at) = push_until_failure(&mut out, decoded) {
                out.truncate(failed_at + 1);
                stopped_early = pending.peek().is_some();
                break;
            }
        }

        self.metrics.finish(started.elapsed());
        self.emit(|| ExecutionEvent::BatchFinished {
            elapsed: started.elapsed(),
            stopped_early,
            metrics: self.metrics.snapshot(),
        });

        out
    }

    fn decode_chunk<T>(&self, first_row: usize, chunk: Vec<MappedRow>) -> Vec<IngestionResult<T>>
    where
        T: DeserializeOwned,
    {
        self.metrics.chunk_started();
        self.emit(|| ExecutionEvent::ChunkStarted {
            first_row,
            rows: chunk.len(),
        });

        let results: Vec<IngestionResult<T>> = chunk.into_iter().map(decode_mapped_row).collect();
        let failed = results.iter().filter(|r| r.is_err()).count();

        self.metrics.chunk_finished(results.len() - failed, failed);
        self.emit(|| ExecutionEvent::ChunkFinished {
            first_row,
            decoded: results.len() - failed,
            failed,
        });
        results
    }

    fn emit(&self, event: impl FnOnce() -> ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event());
        }
    }
}

/// Append every result in order. Returns the index in `out` of the first failure, if any.
fn push_until_failure<T>(out: &mut Vec<IngestionResult<T>>, decoded: Vec<Vec<IngestionResult<T>>>) -> Option<usize> {
    let mut first_failure = None;
    for result in decoded.into_iter().flatten() {
        if first_failure.is_none() && result.is_err() {
            first_failure = Some(out.len());
        }
        out.push(result);
    }
    first_failure
}

fn execution_error(message: String) -> IngestionError {
    IngestionError::Execution { message }
}

/// Split `rows` into owned chunks tagged with the position of their first row.
fn into_chunks(rows: Vec<MappedRow>, chunk_size: usize) -> Vec<(usize, Vec<MappedRow>)> {
    let mut chunks = Vec::with_capacity(rows.len().div_ceil(chunk_size));
    let mut rows = rows.into_iter().peekable();
    let mut first_row = 0;
    while rows.peek().is_some() {
        let chunk: Vec<MappedRow> = rows.by_ref().take(chunk_size).collect();
        let len = chunk.len();
        chunks.push((first_row, chunk));
        first_row += len;
    }
    chunks
}

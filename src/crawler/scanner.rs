//! Parallel segment scanner
//!
//! This module handles:
//! - One scan task per segment, gated by a global semaphore
//! - Cursor chaining within a segment
//! - Retry with backoff for retryable store errors
//! - Cooperative cancellation before every fetch
//! - Optional fail-fast when a segment hits a fatal error
//!
//! Records from all segments are merged into a single bounded channel and
//! exposed as a `RecordStream`. No ordering holds across segments.

use crate::crawler::retry::RetryPolicy;
use crate::crawler::SegmentDescriptor;
use crate::state::{CancellationSignal, SegmentStatus};
use crate::storage::{PageFetcher, RecordPage, ScanCursor, StoreError};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_stream::wrappers::ReceiverStream;

/// Final accounting for one segment's scan task
#[derive(Debug)]
pub struct SegmentOutcome {
    pub segment: SegmentDescriptor,

    /// Pages fetched successfully
    pub pages: u64,

    /// Records handed to the record stream
    pub records: u64,

    /// Retryable failures absorbed by backoff
    pub retries: u32,

    pub status: SegmentStatus,
}

/// Merged, unordered stream of records from every segment
///
/// Ends once every segment task has finished. Dropping it makes the
/// remaining tasks stop at their next send.
pub struct RecordStream<R> {
    inner: ReceiverStream<R>,
}

impl<R> RecordStream<R> {
    fn new(rx: mpsc::Receiver<R>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }
}

impl<R> Stream for RecordStream<R> {
    type Item = R;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<R>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Handle on a running scan
pub struct ScanHandle {
    abort: CancellationSignal,
    supervisor: JoinHandle<Vec<SegmentOutcome>>,
}

impl ScanHandle {
    /// Stops every segment task at its next checkpoint
    pub fn abort(&self) {
        self.abort.request_stop();
    }

    /// The scanner-internal abort signal (raised by fail-fast or a dispatcher failure)
    pub fn abort_signal(&self) -> CancellationSignal {
        self.abort.clone()
    }

    /// Waits for every segment task and returns their outcomes ordered by index
    ///
    /// A task that panicked has no outcome, so the result can be shorter than
    /// the segment list.
    pub async fn join(self) -> Result<Vec<SegmentOutcome>, JoinError> {
        self.supervisor.await
    }
}

/// Runs one scan task per segment with bounded concurrency
pub struct ParallelScanner<F: PageFetcher> {
    fetcher: Arc<F>,
    retry: RetryPolicy,
    fail_fast: bool,
    record_buffer: usize,
}

impl<F: PageFetcher> ParallelScanner<F> {
    pub fn new(fetcher: Arc<F>, retry: RetryPolicy) -> Self {
        Self {
            fetcher,
            retry,
            fail_fast: false,
            record_buffer: 1024,
        }
    }

    /// Whether a fatal error in one segment stops all others
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Capacity of the channel feeding the record stream
    pub fn with_record_buffer(mut self, record_buffer: usize) -> Self {
        self.record_buffer = record_buffer.max(1);
        self
    }

    /// Starts scanning `segments`
    ///
    /// At most `min(concurrency_limit, segments.len())` segment tasks run at
    /// once; the rest wait for a free permit. Every task checks `cancellation`
    /// (and the scanner's own abort signal) before each fetch.
    ///
    /// # Returns
    ///
    /// The merged record stream, and a handle that yields each segment's outcome.
    pub fn scan(
        &self,
        segments: Vec<SegmentDescriptor>,
        concurrency_limit: usize,
        cancellation: CancellationSignal,
    ) -> (RecordStream<F::Record>, ScanHandle) {
        let (tx, rx) = mpsc::channel(self.record_buffer);
        let abort = CancellationSignal::new();
        let semaphore = Arc::new(Semaphore::new(concurrency_limit.max(1)));

        let task = SegmentTask {
            fetcher: self.fetcher.clone(),
            retry: self.retry.clone(),
            fail_fast: self.fail_fast,
            stop: cancellation,
            abort: abort.clone(),
        };

        let supervisor = tokio::spawn(async move {
            let mut tasks = JoinSet::new();

            for segment in segments {
                // Queued segments wait here until a running segment finishes
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let task = task.clone();
                let tx = tx.clone();
                tasks.spawn(async move {
                    let outcome = task.run(segment, tx).await;
                    drop(permit);
                    outcome
                });
            }

            // The stream ends once the last task drops its sender
            drop(tx);

            let mut outcomes = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(e) => tracing::error!("Segment task panicked: {}", e),
                }
            }
            outcomes.sort_by_key(|outcome| outcome.segment.index);
            outcomes
        });

        (
            RecordStream::new(rx),
            ScanHandle { abort, supervisor },
        )
    }
}

/// Why a fetch did not produce a page
enum FetchFailure {
    Cancelled,
    Fatal(StoreError),
}

/// Everything a segment task needs, shared by all segments of one scan
struct SegmentTask<F: PageFetcher> {
    fetcher: Arc<F>,
    retry: RetryPolicy,
    fail_fast: bool,
    stop: CancellationSignal,
    abort: CancellationSignal,
}

impl<F: PageFetcher> Clone for SegmentTask<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            retry: self.retry.clone(),
            fail_fast: self.fail_fast,
            stop: self.stop.clone(),
            abort: self.abort.clone(),
        }
    }
}

impl<F: PageFetcher> SegmentTask<F> {
    fn should_stop(&self) -> bool {
        self.stop.is_stop_requested() || self.abort.is_stop_requested()
    }

    async fn run(&self, segment: SegmentDescriptor, tx: mpsc::Sender<F::Record>) -> SegmentOutcome {
        let mut outcome = SegmentOutcome {
            segment,
            pages: 0,
            records: 0,
            retries: 0,
            status: SegmentStatus::Cancelled,
        };
        let mut cursor = ScanCursor::Start;

        tracing::debug!(segment = segment.index, total = segment.total, "Segment scan started");

        outcome.status = 'scan: loop {
            if self.should_stop() {
                break SegmentStatus::Cancelled;
            }

            let page = match self.fetch_with_retry(segment, &cursor, &mut outcome.retries).await {
                Ok(page) => page,
                Err(FetchFailure::Cancelled) => break SegmentStatus::Cancelled,
                Err(FetchFailure::Fatal(err)) => {
                    tracing::error!(
                        segment = segment.index,
                        total = segment.total,
                        "Fatal store error, abandoning segment: {}",
                        err
                    );
                    if self.fail_fast && self.abort.request_stop() {
                        tracing::warn!("Fail-fast enabled, stopping all segments");
                    }
                    break SegmentStatus::Failed(err);
                }
            };

            outcome.pages += 1;
            for record in page.records {
                if tx.send(record).await.is_err() {
                    // Dispatcher is gone; nothing left to deliver to
                    break 'scan SegmentStatus::Cancelled;
                }
                outcome.records += 1;
            }

            cursor = page.next;
            if cursor.is_exhausted() {
                break SegmentStatus::Exhausted;
            }
        };

        tracing::info!(
            segment = segment.index,
            total = segment.total,
            pages = outcome.pages,
            records = outcome.records,
            retries = outcome.retries,
            "Segment finished: {}",
            outcome.status
        );

        outcome
    }

    async fn fetch_with_retry(
        &self,
        segment: SegmentDescriptor,
        cursor: &ScanCursor,
        retries: &mut u32,
    ) -> Result<RecordPage<F::Record>, FetchFailure> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.fetcher.fetch_page(segment, cursor).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(FetchFailure::Fatal(err)),
            };

            let Some(delay) = self.retry.delay_after(attempts) else {
                return Err(FetchFailure::Fatal(StoreError::RetriesExhausted {
                    attempts,
                    last: Box::new(err),
                }));
            };

            *retries += 1;
            tracing::warn!(
                segment = segment.index,
                total = segment.total,
                attempt = attempts,
                "Retryable store error, backing off {:?}: {}",
                delay,
                err
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.stop.stopped() => return Err(FetchFailure::Cancelled),
                _ = self.abort.stopped() => return Err(FetchFailure::Cancelled),
            }

            if self.should_stop() {
                return Err(FetchFailure::Cancelled);
            }
        }
    }
}

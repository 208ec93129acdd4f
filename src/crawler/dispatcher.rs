//! Record dispatch
//!
//! Pulls records off the merged scan stream and hands each one to the
//! caller's processor. Processing failures are not retried: the first one
//! stops dispatch and raises the scanner's abort signal.

use crate::crawler::scanner::RecordStream;
use crate::state::CancellationSignal;
use crate::storage::Keyed;
use crate::ProcessingError;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Caller-supplied per-record processing step
///
/// Implementations must be idempotent: a later crawl re-reads and
/// re-dispatches every record.
#[async_trait]
pub trait RecordProcessor<R: Send + Sync + 'static>: Send + Sync + 'static {
    async fn process(&self, record: &R) -> anyhow::Result<()>;
}

#[async_trait]
impl<R, F> RecordProcessor<R> for F
where
    R: Send + Sync + 'static,
    F: Fn(&R) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn process(&self, record: &R) -> anyhow::Result<()> {
        self(record)
    }
}

/// Delivers records to a processor, counting successful dispatches
pub struct RecordDispatcher<R: Send + Sync + 'static> {
    processor: Arc<dyn RecordProcessor<R>>,
    dispatched: Arc<AtomicU64>,
    concurrency: usize,
}

impl<R: Keyed + Send + Sync + 'static> RecordDispatcher<R> {
    /// Creates a dispatcher running up to `concurrency` processor calls at once
    pub fn new(processor: Arc<dyn RecordProcessor<R>>, concurrency: usize) -> Self {
        Self {
            processor,
            dispatched: Arc::new(AtomicU64::new(0)),
            concurrency: concurrency.max(1),
        }
    }

    /// Processes a single record
    pub async fn dispatch(&self, record: R) -> Result<(), ProcessingError> {
        match self.processor.process(&record).await {
            Ok(()) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(cause) => Err(ProcessingError {
                key: record.key().to_string(),
                cause,
            }),
        }
    }

    /// Dispatches every record in `stream` until it ends or a record fails
    ///
    /// On failure, `abort` is raised before returning so that segment tasks
    /// stop fetching, and the stream is dropped.
    pub async fn run(
        &self,
        stream: RecordStream<R>,
        abort: &CancellationSignal,
    ) -> Result<u64, ProcessingError> {
        let result = stream
            .map(Ok)
            .try_for_each_concurrent(self.concurrency, |record| self.dispatch(record))
            .await;

        if let Err(err) = &result {
            tracing::error!("Record processing failed, aborting crawl: {}", err);
            abort.request_stop();
        }

        result.map(|()| self.dispatched())
    }

    /// Records successfully processed so far
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Shared handle on the dispatch counter, for progress reporting
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.dispatched.clone()
    }
}

/// Processor that counts records and logs progress
///
/// Used by the command-line binary, where the crawl itself is the job.
pub struct CountingProcessor {
    seen: AtomicU64,
    log_every: u64,
}

impl CountingProcessor {
    pub fn new(log_every: u64) -> Self {
        Self {
            seen: AtomicU64::new(0),
            log_every: log_every.max(1),
        }
    }

    pub fn count(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<R: Keyed + Send + Sync + 'static> RecordProcessor<R> for CountingProcessor {
    async fn process(&self, record: &R) -> anyhow::Result<()> {
        let seen = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.log_every == 0 {
            tracing::info!("Processed {} records (last: {})", seen, record.key());
        }
        Ok(())
    }
}

//! Crawl orchestration
//!
//! This module wires the crawl together:
//! - Validating the segment count before anything else runs
//! - Checking the store's connection pool against the concurrency limit
//! - Bracketing the scan with the stop signal monitor
//! - Running the scanner and dispatcher to completion or cancellation
//! - Deriving and reporting the terminal status once

use crate::config::Config;
use crate::crawler::dispatcher::{RecordDispatcher, RecordProcessor};
use crate::crawler::planner::{partition, SegmentDescriptor};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scanner::{ParallelScanner, SegmentOutcome};
use crate::output::{MetricsSink, NoopMetrics};
use crate::state::{CancellationSignal, CrawlStatus, SegmentStatus};
use crate::stop::{StopSignalMonitor, StopTrigger};
use crate::storage::PageFetcher;
use crate::{ConfigError, CrawlError, ProcessingError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Tunables for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub concurrency_limit: usize,
    pub fail_fast: bool,
    pub record_buffer: usize,
    pub dispatch_concurrency: usize,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency_limit: config.crawler.max_concurrency,
            fail_fast: config.crawler.fail_fast,
            record_buffer: config.crawler.record_buffer,
            dispatch_concurrency: config.crawler.dispatch_concurrency,
            retry: RetryPolicy::from_config(&config.retry),
            poll_interval: config.stop_listener.poll_interval(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            fail_fast: false,
            record_buffer: 1024,
            dispatch_concurrency: 16,
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Result of a crawl run, reported once at the end
#[derive(Debug)]
pub struct CrawlReport {
    pub status: CrawlStatus,
    pub segments: Vec<SegmentOutcome>,
    /// Number of segments requested; may exceed `segments.len()` if a task panicked
    pub segment_total: u32,
    pub records_dispatched: u64,
    pub stop_requested: bool,
    pub processing_error: Option<ProcessingError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl CrawlReport {
    pub fn completed_segments(&self) -> Vec<SegmentDescriptor> {
        self.segments
            .iter()
            .filter(|o| o.status.is_exhausted())
            .map(|o| o.segment)
            .collect()
    }

    pub fn failed_segments(&self) -> Vec<&SegmentOutcome> {
        self.segments
            .iter()
            .filter(|o| o.status.is_failed())
            .collect()
    }

    pub fn cancelled_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|o| matches!(o.status, SegmentStatus::Cancelled))
            .count()
    }

    /// Every fatal store or processing error, one line each
    pub fn failures(&self) -> Vec<String> {
        let mut failures: Vec<String> = self
            .failed_segments()
            .iter()
            .map(|o| format!("segment {} {}", o.segment, o.status))
            .collect();
        let lost = (self.segment_total as usize).saturating_sub(self.segments.len());
        if lost > 0 {
            failures.push(format!("{} segment task(s) ended without an outcome", lost));
        }
        if let Some(err) = &self.processing_error {
            failures.push(err.to_string());
        }
        failures
    }

    pub fn total_retries(&self) -> u64 {
        self.segments.iter().map(|o| u64::from(o.retries)).sum()
    }

    /// One-line summary for the final log entry
    pub fn summary_line(&self) -> String {
        format!(
            "Crawl {}: {} records dispatched, {}/{} segments completed, {} failed, {} cancelled in {:.1?}",
            self.status,
            self.records_dispatched,
            self.completed_segments().len(),
            self.segment_total,
            self.failed_segments().len(),
            self.cancelled_segments(),
            self.duration
        )
    }
}

/// Runs one segmented crawl over a page fetcher
///
/// An orchestrator owns the cancellation signal of a single run, and `run`
/// consumes it. A stopped crawl is resumed by building a new orchestrator.
pub struct CrawlOrchestrator<F: PageFetcher> {
    fetcher: Arc<F>,
    settings: CrawlSettings,
    cancellation: CancellationSignal,
    monitor: StopSignalMonitor,
    metrics: Arc<dyn MetricsSink>,
    status: watch::Sender<CrawlStatus>,
}

impl<F: PageFetcher> CrawlOrchestrator<F> {
    /// Creates an orchestrator with no stop triggers and no-op metrics
    pub fn new(fetcher: Arc<F>, settings: CrawlSettings) -> Self {
        let cancellation = CancellationSignal::new();
        let monitor = StopSignalMonitor::new(settings.poll_interval, cancellation.clone());
        let (status, _rx) = watch::channel(CrawlStatus::Running);

        Self {
            fetcher,
            settings,
            cancellation,
            monitor,
            metrics: Arc::new(NoopMetrics),
            status,
        }
    }

    /// Adds an external stop trigger watched while the crawl runs
    pub fn with_trigger(mut self, trigger: Arc<dyn StopTrigger>) -> Self {
        self.monitor.add_trigger(trigger);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The signal the stop monitor raises; exposed so hosts and tests can abort directly
    pub fn cancellation(&self) -> CancellationSignal {
        self.cancellation.clone()
    }

    /// Follows the crawl status: running, then stopping (if asked), then terminal
    pub fn subscribe_status(&self) -> watch::Receiver<CrawlStatus> {
        self.status.subscribe()
    }

    pub fn monitor(&self) -> &StopSignalMonitor {
        &self.monitor
    }

    /// Runs a crawl over `segment_count` segments
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The crawl ran; inspect `status` for the outcome
    /// * `Err(CrawlError)` - The crawl could not start (bad segment count,
    ///   undersized pool, stop listener failure) or a task failed to join
    pub async fn run(
        self,
        segment_count: i64,
        processor: Arc<dyn RecordProcessor<F::Record>>,
    ) -> Result<CrawlReport, CrawlError> {
        let segments = partition(segment_count)?;
        let segment_total = segments.len() as u32;
        self.check_pool(segments.len())?;

        let processors = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        tracing::info!(
            "Crawling accounts with {} segments and {} processors",
            segment_total,
            processors
        );

        let started_at = Utc::now();
        let start = Instant::now();
        self.status.send_replace(CrawlStatus::Running);

        let monitor = self.monitor.start().await?;
        let scanned = self.scan_and_dispatch(segments, processor).await;
        monitor.stop().await;
        let (outcomes, dispatched, processing_error) = scanned?;

        let duration = start.elapsed();
        // A panicked segment task leaves no outcome and counts as failed
        let missing = outcomes.len() < segment_total as usize;
        let any_failed = processing_error.is_some()
            || missing
            || outcomes.iter().any(|o| o.status.is_failed());
        let all_exhausted = !missing && outcomes.iter().all(|o| o.status.is_exhausted());
        let status = CrawlStatus::derive(any_failed, all_exhausted);

        let report = CrawlReport {
            status,
            segments: outcomes,
            segment_total,
            records_dispatched: dispatched,
            stop_requested: self.cancellation.is_stop_requested(),
            processing_error,
            started_at,
            finished_at: Utc::now(),
            duration,
        };

        self.record_metrics(&report);
        self.status.send_replace(status);

        if status.is_success() {
            tracing::info!("{}", report.summary_line());
        } else {
            tracing::error!("{}", report.summary_line());
            for failure in report.failures() {
                tracing::error!("  {}", failure);
            }
        }

        Ok(report)
    }

    async fn scan_and_dispatch(
        &self,
        segments: Vec<SegmentDescriptor>,
        processor: Arc<dyn RecordProcessor<F::Record>>,
    ) -> Result<(Vec<SegmentOutcome>, u64, Option<ProcessingError>), CrawlError> {
        let scanner = ParallelScanner::new(self.fetcher.clone(), self.settings.retry.clone())
            .with_fail_fast(self.settings.fail_fast)
            .with_record_buffer(self.settings.record_buffer);
        let (stream, handle) = scanner.scan(
            segments,
            self.settings.concurrency_limit,
            self.cancellation.clone(),
        );

        let dispatcher = RecordDispatcher::new(processor, self.settings.dispatch_concurrency);
        let abort = handle.abort_signal();
        let dispatch = dispatcher.run(stream, &abort);
        tokio::pin!(dispatch);

        let dispatched = tokio::select! {
            result = &mut dispatch => result,
            _ = self.cancellation.stopped() => {
                tracing::info!("Stop requested, segment tasks will finish their current page");
                self.status.send_replace(CrawlStatus::Stopping);
                dispatch.await
            }
        };

        let outcomes = handle.join().await?;
        Ok(match dispatched {
            Ok(count) => (outcomes, count, None),
            Err(err) => (outcomes, dispatcher.dispatched(), Some(err)),
        })
    }

    fn check_pool(&self, segments: usize) -> Result<(), ConfigError> {
        let concurrency = self.settings.concurrency_limit.min(segments);
        match self.fetcher.max_connections() {
            Some(pool) if pool < concurrency => {
                Err(ConfigError::PoolTooSmall { pool, concurrency })
            }
            _ => Ok(()),
        }
    }

    fn record_metrics(&self, report: &CrawlReport) {
        self.metrics.record_duration(report.duration);
        self.metrics.record_dispatched(report.records_dispatched);

        let retries = report.total_retries();
        if retries > 0 {
            self.metrics.record_error("transient", retries);
        }
        for outcome in report.failed_segments() {
            if let SegmentStatus::Failed(err) = &outcome.status {
                self.metrics.record_error(err.kind(), 1);
            }
        }
        if report.processing_error.is_some() {
            self.metrics.record_error("processing", 1);
        }
    }
}

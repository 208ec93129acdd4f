//! Crawler module for segmented full-table scans
//!
//! This module contains the core crawling logic, including:
//! - Segment planning
//! - Parallel per-segment scanning with retry and backoff
//! - Record dispatch to a caller-supplied processor
//! - Overall crawl orchestration and status derivation

mod dispatcher;
mod orchestrator;
mod planner;
mod retry;
mod scanner;

pub use dispatcher::{CountingProcessor, RecordDispatcher, RecordProcessor};
pub use orchestrator::{CrawlOrchestrator, CrawlReport, CrawlSettings};
pub use planner::{partition, SegmentDescriptor};
pub use retry::RetryPolicy;
pub use scanner::{ParallelScanner, RecordStream, ScanHandle, SegmentOutcome};

use crate::config::{validate_segment_count, Config};
use crate::output::MetricsSink;
use crate::stop::{triggers_from_config, StopTrigger};
use crate::storage::open_store;
use crate::CrawlError;
use std::sync::Arc;

/// Runs a complete crawl over the configured account store
///
/// This is the main entry point used by the binary. It will:
/// 1. Validate the segment count
/// 2. Open the account store
/// 3. Register the configured stop triggers plus any `extra_triggers`
/// 4. Scan every segment and count each account
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `segment_count` - Number of segments to split the scan into
/// * `extra_triggers` - Triggers supplied by the host, such as Ctrl-C
/// * `metrics` - Sink for the run's duration, throughput and error counts
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl ran; its status may still be failed
/// * `Err(CrawlError)` - The crawl could not start
pub async fn crawl(
    config: &Config,
    segment_count: i64,
    extra_triggers: Vec<Arc<dyn StopTrigger>>,
    metrics: Arc<dyn MetricsSink>,
) -> Result<CrawlReport, CrawlError> {
    validate_segment_count(segment_count)?;

    let store = Arc::new(open_store(config)?);
    let mut orchestrator =
        CrawlOrchestrator::new(store, CrawlSettings::from_config(config)).with_metrics(metrics);

    for trigger in triggers_from_config(&config.stop_listener)
        .into_iter()
        .chain(extra_triggers)
    {
        tracing::debug!("Registering stop trigger: {}", trigger.name());
        orchestrator = orchestrator.with_trigger(trigger);
    }

    let processor = Arc::new(CountingProcessor::new(10_000));
    orchestrator.run(segment_count, processor).await
}

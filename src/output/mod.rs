//! Output module for crawl reports and metrics
//!
//! This module handles:
//! - Pushing run metrics to a `MetricsSink`
//! - Condensing a finished crawl into printable statistics

mod metrics;
pub mod stats;

pub use metrics::{InMemoryMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use stats::{print_statistics, CrawlStatistics};

use crate::crawler::CrawlReport;

/// Prints the statistics of a finished crawl to stdout
pub fn print_report(report: &CrawlReport) {
    print_statistics(&CrawlStatistics::from_report(report));
}

//! Statistics for a finished crawl
//!
//! This module condenses a `CrawlReport` into counts and prints them.

use crate::crawler::CrawlReport;
use crate::state::{CrawlStatus, SegmentStatus};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    pub status: CrawlStatus,

    /// Records successfully processed
    pub records_dispatched: u64,

    /// Total segments requested
    pub segment_total: u32,

    /// Count of segment outcomes by status label
    pub segments_by_status: HashMap<&'static str, u32>,

    /// Fatal errors by kind
    pub error_summary: HashMap<String, u64>,

    /// Transient failures absorbed by retries
    pub retries: u64,

    pub pages_fetched: u64,

    pub duration_seconds: f64,

    /// Segment descriptors that were fully scanned, as `index/total`
    pub completed_segments: Vec<String>,
}

impl CrawlStatistics {
    /// Builds statistics from a crawl report
    ///
    /// # Arguments
    ///
    /// * `report` - The report of a finished crawl
    pub fn from_report(report: &CrawlReport) -> Self {
        let mut segments_by_status = HashMap::new();
        let mut error_summary = HashMap::new();

        for outcome in &report.segments {
            *segments_by_status.entry(outcome.status.as_str()).or_insert(0) += 1;
            if let SegmentStatus::Failed(err) = &outcome.status {
                *error_summary.entry(err.kind().to_string()).or_insert(0) += 1;
            }
        }

        let missing = (report.segment_total as usize).saturating_sub(report.segments.len());
        if missing > 0 {
            segments_by_status.insert("lost", missing as u32);
        }

        if report.processing_error.is_some() {
            *error_summary.entry("processing".to_string()).or_insert(0) += 1;
        }

        Self {
            status: report.status,
            records_dispatched: report.records_dispatched,
            segment_total: report.segment_total,
            segments_by_status,
            error_summary,
            retries: report.total_retries(),
            pages_fetched: report.segments.iter().map(|o| o.pages).sum(),
            duration_seconds: report.duration.as_secs_f64(),
            completed_segments: report
                .completed_segments()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Records processed per second over the whole run
    pub fn throughput(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            self.records_dispatched as f64 / self.duration_seconds
        } else {
            0.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Status: {}", stats.status);
    println!("  Records dispatched: {}", stats.records_dispatched);
    println!("  Pages fetched: {}", stats.pages_fetched);
    println!("  Retries: {}", stats.retries);
    println!(
        "  Duration: {:.1}s ({:.0} records/s)",
        stats.duration_seconds,
        stats.throughput()
    );
    println!();

    println!("Segments by Status ({} total):", stats.segment_total);
    let mut status_counts: Vec<_> = stats.segments_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (status, count) in status_counts {
        println!("  {}: {}", status, count);
    }
    println!();

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

        for (kind, count) in error_counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    if !stats.completed_segments.is_empty() && stats.status != CrawlStatus::Completed {
        println!("Completed Segments ({}):", stats.completed_segments.len());
        for segment in &stats.completed_segments {
            println!("  - {}", segment);
        }
        println!();
    }
}

/// Crawl and segment status definitions
///
/// This module defines the states a crawl run and each of its segments can be in.
use crate::storage::StoreError;
use std::fmt;

/// Represents the current state of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    // ===== Active States =====
    /// Segments are being scanned
    Running,

    /// A stop was requested; tasks are winding down at their next checkpoint
    Stopping,

    // ===== Terminal States =====
    /// Every segment was exhausted without a fatal error
    Completed,

    /// The crawl was stopped on request before every segment was exhausted
    CompletedPartial,

    /// A fatal store error or a processing error occurred
    Failed,
}

impl CrawlStatus {
    /// Derives the terminal status of a run from its aggregate outcome
    ///
    /// Failure wins over everything. A stop request that arrives after every
    /// segment was already exhausted still yields `Completed`.
    pub fn derive(any_failed: bool, all_exhausted: bool) -> Self {
        if any_failed {
            Self::Failed
        } else if all_exhausted {
            Self::Completed
        } else {
            Self::CompletedPartial
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running | Self::Stopping)
    }

    /// Returns true if the process should exit with status zero
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedPartial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::CompletedPartial => "completed-with-partial-results",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single segment's scan task ended
#[derive(Debug)]
pub enum SegmentStatus {
    /// The fetcher returned the exhaustion marker
    Exhausted,

    /// The task stopped at a checkpoint before exhaustion
    Cancelled,

    /// A fatal store error ended the task
    Failed(StoreError),
}

impl SegmentStatus {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "failed: {}", err),
            other => f.write_str(other.as_str()),
        }
    }
}

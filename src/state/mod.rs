//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CancellationSignal`: the shared, monotonic stop flag read by every scan task
//! - `CrawlStatus`: the run-level status reported at the end of a crawl
//! - `SegmentStatus`: how an individual segment's scan ended

mod cancellation;
mod crawl_status;

// Re-export main types
pub use cancellation::{CancellationSignal, SignalState};
pub use crawl_status::{CrawlStatus, SegmentStatus};

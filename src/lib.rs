//! Account-Crawler: a segmented parallel crawler over a partitioned account store
//!
//! The key space is split into a fixed number of segments, each segment is
//! scanned page by page on its own task, and every record is handed to a
//! caller-supplied processor exactly once. Long scans can be aborted from the
//! outside through a cooperative stop signal.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod stop;
pub mod storage;

use thiserror::Error;

pub use storage::StoreError;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Stop listener error: {0}")]
    StopListener(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
///
/// Any of these aborts the run before a single page is fetched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Segment count must be between 1 and {}, got {got}", u32::MAX)]
    InvalidSegmentCount { got: i64 },

    #[error("Store pool has {pool} connections but crawl concurrency is {concurrency}")]
    PoolTooSmall { pool: usize, concurrency: usize },
}

/// A failure raised by the record processor
///
/// Processing failures are never retried by the crawler and end the whole run.
#[derive(Debug, Error)]
#[error("Failed to process record {key}: {cause:#}")]
pub struct ProcessingError {
    /// Key of the record that could not be processed
    pub key: String,

    /// The processor's error
    pub cause: anyhow::Error,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    partition, CrawlOrchestrator, CrawlReport, ParallelScanner, RecordDispatcher,
    RecordProcessor, SegmentDescriptor,
};
pub use state::{CancellationSignal, CrawlStatus};
pub use stop::StopSignalMonitor;
pub use storage::{Account, PageFetcher, RecordPage, ScanCursor};

//! Store traits and error types
//!
//! This module defines the paged-scan contract the crawler consumes and the
//! error taxonomy every store implementation maps its failures into.

use crate::crawler::SegmentDescriptor;
use async_trait::async_trait;
use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur while fetching a page
///
/// `Timeout` and `Throttled` are retryable; everything else ends the
/// segment that hit it.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt cursor: {0}")]
    CorruptCursor(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<StoreError> },
}

impl StoreError {
    /// Returns true if the failed fetch may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Throttled(_))
    }

    /// Short label used for metrics and the summary line
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Throttled(_) => "throttled",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::CorruptCursor(_) => "corrupt_cursor",
            Self::Backend(_) => "backend",
            Self::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        match &err {
            rusqlite::Error::SqliteFailure(failure, detail) => match failure.code {
                ErrorCode::DatabaseBusy => Self::Timeout(message),
                ErrorCode::DatabaseLocked => Self::Throttled(message),
                ErrorCode::PermissionDenied
                | ErrorCode::AuthorizationForStatementDenied
                | ErrorCode::CannotOpen => Self::PermissionDenied(message),
                ErrorCode::NotFound => Self::NotFound(message),
                _ if detail
                    .as_deref()
                    .is_some_and(|d| d.starts_with("no such table")) =>
                {
                    Self::NotFound(message)
                }
                _ => Self::Backend(message),
            },
            _ => Self::Backend(message),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque continuation token for paged reads within one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCursor {
    /// Nothing has been read from the segment yet
    Start,

    /// Resume after the position encoded in the token
    Token(String),

    /// The segment has no more records
    Exhausted,
}

impl ScanCursor {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

/// One page of records plus the cursor to continue from
#[derive(Debug, Clone)]
pub struct RecordPage<R> {
    pub records: Vec<R>,
    pub next: ScanCursor,
}

impl<R> RecordPage<R> {
    /// A page with more records to follow
    pub fn more(records: Vec<R>, token: impl Into<String>) -> Self {
        Self {
            records,
            next: ScanCursor::Token(token.into()),
        }
    }

    /// The final page of a segment
    pub fn last(records: Vec<R>) -> Self {
        Self {
            records,
            next: ScanCursor::Exhausted,
        }
    }
}

/// Records that carry a unique key
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Paged, segmented read access to a record store
///
/// Implementations must be safe to call from many segment tasks at once.
/// A given segment is only ever read sequentially.
#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    type Record: Keyed + Send + Sync + 'static;

    /// Fetches the page following `cursor` in `segment`
    ///
    /// `cursor` is never `Exhausted`.
    async fn fetch_page(
        &self,
        segment: SegmentDescriptor,
        cursor: &ScanCursor,
    ) -> StoreResult<RecordPage<Self::Record>>;

    /// Number of connections backing this fetcher, if bounded
    fn max_connections(&self) -> Option<usize> {
        None
    }
}

//! In-memory account store
//!
//! Holds accounts in a `Vec` and assigns each one to a segment by hashing its
//! key, which spreads records unevenly across segments the way a real
//! partitioned table does. Supports injected latency and scripted faults so
//! the crawler's retry, fail-fast and cancellation paths can be exercised.

use crate::crawler::SegmentDescriptor;
use crate::storage::traits::{Keyed, PageFetcher, RecordPage, ScanCursor, StoreError, StoreResult};
use crate::storage::Account;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted failure for one page of one segment
#[derive(Debug, Clone)]
struct Fault {
    segment: u32,
    page: usize,
    error: StoreError,
    remaining: usize,
}

/// Account store backed by a `Vec`
pub struct InMemoryAccountStore {
    accounts: Vec<Account>,
    page_size: usize,
    latency: Duration,
    max_connections: Option<usize>,
    faults: Mutex<Vec<Fault>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemoryAccountStore {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts,
            page_size: 100,
            latency: Duration::ZERO,
            max_connections: None,
            faults: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Builds a store of `count` generated accounts
    pub fn with_generated(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| Account {
                    uuid: format!("acct-{:08}", i),
                    number: format!("+1555{:07}", i),
                    version: 1,
                })
                .collect(),
        )
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delays every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Fails the first `times` fetches of page `page` in segment `segment`
    ///
    /// Pages are numbered from zero within a segment. Use `usize::MAX` for a
    /// fault that never clears.
    pub fn fail_page(self, segment: u32, page: usize, error: StoreError, times: usize) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(Fault {
                segment,
                page,
                error,
                remaining: times,
            });
        }
        self
    }

    /// Number of fetches issued so far, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches that were in progress at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Number of accounts that belong to `segment`
    pub fn segment_len(&self, segment: SegmentDescriptor) -> usize {
        self.accounts
            .iter()
            .filter(|a| segment_for_key(a.key(), segment.total) == segment.index)
            .count()
    }

    fn take_fault(&self, segment: u32, page: usize) -> Option<StoreError> {
        let mut faults = match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let fault = faults
            .iter_mut()
            .find(|f| f.segment == segment && f.page == page && f.remaining > 0)?;
        fault.remaining -= 1;
        Some(fault.error.clone())
    }

    fn read_page(&self, segment: SegmentDescriptor, page: usize, start: usize) -> RecordPage<Account> {
        let mut records = Vec::with_capacity(self.page_size);
        let mut last_position = start;

        for (position, account) in self.accounts.iter().enumerate().skip(start) {
            if segment_for_key(account.key(), segment.total) != segment.index {
                continue;
            }
            records.push(account.clone());
            last_position = position;
            if records.len() == self.page_size {
                break;
            }
        }

        if records.len() < self.page_size {
            RecordPage::last(records)
        } else {
            RecordPage::more(records, format!("{}:{}", page + 1, last_position + 1))
        }
    }
}

#[async_trait]
impl PageFetcher for InMemoryAccountStore {
    type Record = Account;

    async fn fetch_page(
        &self,
        segment: SegmentDescriptor,
        cursor: &ScanCursor,
    ) -> StoreResult<RecordPage<Account>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = match parse_cursor(cursor) {
            Ok((page, start)) => match self.take_fault(segment.index, page) {
                Some(err) => Err(err),
                None => Ok(self.read_page(segment, page, start)),
            },
            Err(err) => Err(err),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }
}

/// Decodes a cursor into (page number, next position to read)
fn parse_cursor(cursor: &ScanCursor) -> StoreResult<(usize, usize)> {
    match cursor {
        ScanCursor::Start => Ok((0, 0)),
        ScanCursor::Token(token) => token
            .split_once(':')
            .and_then(|(page, position)| Some((page.parse().ok()?, position.parse().ok()?)))
            .ok_or_else(|| StoreError::CorruptCursor(token.clone())),
        ScanCursor::Exhausted => Err(StoreError::CorruptCursor(
            "fetch after exhaustion".to_string(),
        )),
    }
}

/// Stable segment assignment for a record key (FNV-1a)
pub fn segment_for_key(key: &str, total: u32) -> u32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % u64::from(total.max(1))) as u32
}

//! SQLite account store
//!
//! Read-only paged scans over the `accounts` table. A segment owns every row
//! whose rowid falls in its non-negative residue class (`rowid mod total ==
//! index`, negative rowids included), and the cursor is the last rowid
//! returned.

use crate::crawler::SegmentDescriptor;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PageFetcher, RecordPage, ScanCursor, StoreError, StoreResult};
use crate::storage::Account;
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// SQLite's `%` keeps the sign of the dividend, so the residue is normalized
// before comparing against the segment index.
const PAGE_QUERY: &str = "SELECT rowid, uuid, number, version FROM accounts \
     WHERE rowid >= ?1 AND (((rowid % ?2) + ?2) % ?2) = ?3 \
     ORDER BY rowid LIMIT ?4";

fn open_read_only(path: &Path) -> StoreResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Fixed-size pool of read-only connections
///
/// Every semaphore permit is backed by one idle connection.
struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
    size: usize,
}

impl ConnectionPool {
    /// Opens a fresh connection in place of one lost with a failed query task
    ///
    /// Returns `false` if the database could not be reopened; the caller must
    /// then retire the permit that connection backed.
    fn replace_lost(&self) -> bool {
        match open_read_only(&self.path) {
            Ok(conn) => {
                self.checkin(conn);
                true
            }
            Err(e) => {
                tracing::error!(
                    "Could not reopen {} after losing a connection: {}",
                    self.path.display(),
                    e
                );
                false
            }
        }
    }

    fn checkout(&self) -> StoreResult<Connection> {
        let mut idle = self
            .idle
            .lock()
            .map_err(|_| StoreError::Backend("connection pool poisoned".to_string()))?;
        idle.pop()
            .ok_or_else(|| StoreError::Backend("no idle connection in pool".to_string()))
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }
}

/// SQLite-backed account store
pub struct SqliteAccountStore {
    pool: ConnectionPool,
    page_size: u32,
}

impl SqliteAccountStore {
    /// Opens `pool_size` read-only connections to an existing database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite accounts database
    /// * `pool_size` - Number of connections; should be at least the crawl concurrency
    /// * `page_size` - Rows returned per page
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteAccountStore)` - All connections opened
    /// * `Err(StoreError)` - The database is missing or unreadable
    pub fn open(path: &Path, pool_size: usize, page_size: u32) -> StoreResult<Self> {
        if !path.exists() {
            return Err(StoreError::NotFound(format!(
                "accounts database {}",
                path.display()
            )));
        }

        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            connections.push(open_read_only(path)?);
        }

        tracing::debug!(
            "Opened {} read-only connections to {}",
            pool_size,
            path.display()
        );

        Ok(Self {
            pool: ConnectionPool {
                path: path.to_path_buf(),
                idle: Mutex::new(connections),
                permits: Semaphore::new(pool_size),
                size: pool_size,
            },
            page_size: page_size.max(1),
        })
    }

    /// Creates an empty accounts database at `path`
    pub fn create(path: &Path) -> StoreResult<()> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for SqliteAccountStore {
    type Record = Account;

    async fn fetch_page(
        &self,
        segment: SegmentDescriptor,
        cursor: &ScanCursor,
    ) -> StoreResult<RecordPage<Account>> {
        let from = match cursor {
            ScanCursor::Start => i64::MIN,
            ScanCursor::Token(token) => {
                let last = token
                    .parse::<i64>()
                    .map_err(|_| StoreError::CorruptCursor(token.clone()))?;
                match last.checked_add(1) {
                    Some(next) => next,
                    None => return Ok(RecordPage::last(Vec::new())),
                }
            }
            ScanCursor::Exhausted => return Ok(RecordPage::last(Vec::new())),
        };

        let permit = self
            .pool
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Backend("connection pool closed".to_string()))?;
        let conn = self.pool.checkout()?;
        let page_size = self.page_size;

        let joined = tokio::task::spawn_blocking(move || {
            let result = query_page(&conn, segment, from, page_size);
            (conn, result)
        })
        .await;

        match joined {
            Ok((conn, result)) => {
                self.pool.checkin(conn);
                result
            }
            Err(e) => {
                // The connection went down with the task
                if !self.pool.replace_lost() {
                    permit.forget();
                }
                Err(StoreError::Backend(format!("page query task failed: {}", e)))
            }
        }
    }

    fn max_connections(&self) -> Option<usize> {
        Some(self.pool.size)
    }
}

fn query_page(
    conn: &Connection,
    segment: SegmentDescriptor,
    from: i64,
    page_size: u32,
) -> StoreResult<RecordPage<Account>> {
    let mut stmt = conn.prepare_cached(PAGE_QUERY)?;
    let rows = stmt.query_map(
        params![
            from,
            i64::from(segment.total),
            i64::from(segment.index),
            i64::from(page_size)
        ],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Account {
                    uuid: row.get(1)?,
                    number: row.get(2)?,
                    version: row.get(3)?,
                },
            ))
        },
    )?;

    let mut records = Vec::with_capacity(page_size as usize);
    let mut last_rowid = None;
    for row in rows {
        let (rowid, account) = row?;
        last_rowid = Some(rowid);
        records.push(account);
    }

    match last_rowid {
        Some(last) if records.len() >= page_size as usize => {
            Ok(RecordPage::more(records, last.to_string()))
        }
        _ => Ok(RecordPage::last(records)),
    }
}

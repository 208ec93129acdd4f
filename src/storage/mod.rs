//! Storage module for reading the account store
//!
//! This module holds the paged-scan contract the crawler consumes and its
//! implementations:
//! - `SqliteAccountStore`: pooled, read-only scans over a SQLite accounts table
//! - `InMemoryAccountStore`: a `Vec`-backed store with fault injection
//!
//! The crawler never writes to a store.

pub mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::InMemoryAccountStore;
pub use schema::initialize_schema;
pub use sqlite::SqliteAccountStore;
pub use traits::{Keyed, PageFetcher, RecordPage, ScanCursor, StoreError, StoreResult};

use crate::config::Config;
use std::path::Path;

/// An account row as read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uuid: String,
    pub number: String,
    pub version: i64,
}

impl Keyed for Account {
    fn key(&self) -> &str {
        &self.uuid
    }
}

/// Opens the configured SQLite account store
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(SqliteAccountStore)` - Store ready for scanning
/// * `Err(StoreError)` - The database could not be opened
pub fn open_store(config: &Config) -> StoreResult<SqliteAccountStore> {
    SqliteAccountStore::open(
        Path::new(&config.store.database_path),
        config.store.pool_size,
        config.crawler.page_size,
    )
}

//! Accounts table schema
//!
//! The crawler only reads this table. The schema lives here so tools and
//! tests can create a compatible database.

use rusqlite::Connection;

/// SQL schema for the accounts database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    uuid TEXT NOT NULL UNIQUE,
    number TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_accounts_number ON accounts(number);
"#;

/// Creates the accounts table if it does not exist
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}

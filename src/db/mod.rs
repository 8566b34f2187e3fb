//! # Database Module
//!
//! Persistent state lives in SQLite through SQLx:
//! - `models`: row types and their domain counterparts
//! - `ceremonies`: challenges issued and awaiting verification
//! - `credentials`: enrolled passkeys and their signature counters
//!
//! Functions take any [`sqlx::SqliteExecutor`] so the verifier can run them
//! inside one transaction, while the options endpoints use the pool directly.

pub mod ceremonies;
pub mod credentials;
pub mod models;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Open a connection pool and bring the schema up to date.
///
/// In-memory databases exist per connection, so they get a single connection
/// that is never recycled. File databases run in WAL mode so several server
/// processes can share one file.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Current time in Unix milliseconds, the unit ceremony expiry is stored in.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

//! Datastore connection, schema bootstrap and read-side queries.
//!
//! Multi-row writes go through [`crate::mutation`]; this module owns single
//! inserts (registration, organization creation, sessions) and every read.

pub mod accounts;
pub mod announcements;
pub mod organizations;
pub mod sessions;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::{
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::debug;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Open a pool for `dsn` with foreign-key enforcement on.
///
/// In-memory databases live and die with their connection, so they get a
/// single connection that is never recycled.
///
/// # Errors
/// Returns an error if the DSN is invalid or the database cannot be opened.
pub async fn connect(dsn: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = is_in_memory(dsn);
    let mut options = SqliteConnectOptions::from_str(dsn)?
        .foreign_keys(true)
        .create_if_missing(true);

    if !in_memory {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .test_before_acquire(true)
    };

    debug!(in_memory, "Opening SQLite pool");
    pool_options.connect_with(options).await
}

/// Create tables and indexes if they do not exist yet.
///
/// # Errors
/// Returns an error if any schema statement fails.
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

fn is_in_memory(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

/// Current time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_dsn() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:clubs?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://clubhouse.db"));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }

    #[tokio::test]
    async fn schema_applies_twice() -> Result<(), sqlx::Error> {
        let pool = connect("sqlite::memory:", 1).await?;
        apply_schema(&pool).await?;
        apply_schema(&pool).await?;
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await?;
        assert_eq!(tables, 8);
        Ok(())
    }
}

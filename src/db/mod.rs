//! Embedded store facade: SQLite pool, sequenced migrations, repositories.
//!
//! All persistence goes through this module. The schema is owned by the
//! sequenced migrations under `migrations/`; each migration is immutable
//! once applied and recorded with its version and name. Lexical (FTS5)
//! mirrors and the price-history append are maintained by triggers declared
//! in the migrations that create the mirrored tables.
//!
//! Writes run in explicit transactions inside the repository methods; reads
//! hit the pool directly. SQLite serializes writers internally, and the
//! configured busy timeout absorbs contention.

pub mod errors;
pub mod handlers;
pub mod models;

use crate::config::StorageConfig;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::str::FromStr;

/// Get the embedded migration set.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Build the connection pool for the embedded store and apply pending
/// migrations. Creates the database file (and parent directory) on first
/// start.
pub async fn connect(storage: &StorageConfig) -> anyhow::Result<SqlitePool> {
    let db_path = storage.db_path();
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(storage.busy_timeout_duration())
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(storage.pool_size)
        .connect_with(options)
        .await?;

    migrator().run(&pool).await?;

    Ok(pool)
}

/// In-memory pool for tests; fully migrated, single shared connection so the
/// schema is visible across acquires.
#[cfg(test)]
pub async fn connect_test() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory dsn")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("open in-memory database");
    migrator().run(&pool).await.expect("apply migrations");
    pool
}

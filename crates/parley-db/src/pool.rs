//! SQLite pool shared by request handlers and the evaluation scheduler.

use std::time::Duration;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::migrations::{run_migrations, MigrationError};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Tunables applied to every pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits behind another interview transaction's
    /// `BEGIN IMMEDIATE` before SQLite reports `SQLITE_BUSY`.
    pub busy_timeout_ms: u64,
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

impl DbRuntimeSettings {
    /// A checkout never waits much longer than a busy writer would.
    fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms.max(1_000) * 2)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Pragmas every engine connection runs with.
#[derive(Debug, Clone, Copy)]
struct EnginePragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<Connection, rusqlite::Error> for EnginePragmas {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        // `:memory:` databases cannot use WAL and say so.
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("journal_mode stayed {journal_mode}, expected wal")),
            ));
        }
        conn.busy_timeout(Duration::from_millis(self.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    }
}

/// Builds the pool without touching the schema.
///
/// With `:memory:` each pooled connection sees its own private database, so
/// anything exercising more than one connection at once needs a file path.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path).with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    );

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_timeout(settings.checkout_timeout())
        .connection_customizer(Box::new(EnginePragmas {
            busy_timeout_ms: settings.busy_timeout_ms,
        }))
        .build(manager)?;

    tracing::debug!(
        db_path,
        pool_max_size = settings.pool_max_size,
        busy_timeout_ms = settings.busy_timeout_ms,
        "database pool ready"
    );
    Ok(pool)
}

/// Opens the pool and brings the schema up to date.
///
/// Returns the pool and how many migrations were applied just now.
pub fn open_database(
    db_path: &str,
    settings: DbRuntimeSettings,
) -> Result<(DbPool, usize), PoolError> {
    let pool = create_pool(db_path, settings)?;
    let applied = run_migrations(&*pool.get()?)?;
    Ok((pool, applied))
}

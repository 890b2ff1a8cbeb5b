//! Database layer for the Parley engine.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Every table the engine touches (positions,
//! questions, candidates, interviews, answers) is created through versioned
//! migrations managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: concurrent readers with a single writer. Every
//!   interview transition takes the write lock with `BEGIN IMMEDIATE`, which
//!   is what serializes answer submission for the same interview.
//! - **`r2d2` connection pool**: bounded connection reuse shared between
//!   request handlers and the evaluation scheduler.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, open_database, DbPool, DbRuntimeSettings, PoolError};

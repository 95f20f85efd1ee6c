//! Durable checkpoint storage.
//!
//! SQLite-backed sink for observer checkpoints, so processing can resume
//! after a restart.
//!
//! # Architecture
//!
//! - `models`: row types of the `checkpoints` table
//! - `repository`: non-regressing upserts and lookups
//! - Connection pooling with SQLite WAL mode for concurrency
//! - Migration system for schema versioning

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{ObserverError, ObserverResult};

pub mod models;
pub mod repository;

pub use models::CheckpointRecord;
pub use repository::CheckpointRepository;

/// Creates a SQLite connection pool and brings the schema up to date.
///
/// # Configuration
///
/// - **WAL mode**: Enables concurrent readers during writes
/// - **Busy timeout**: 30 seconds to handle lock contention
/// - **Max connections**: 5, or 1 for in-memory databases (each connection
///   would otherwise see its own empty database)
///
/// # Example
///
/// ```no_run
/// use eth_log_observer::db::create_pool;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool("sqlite:./observer.db").await?;
///     Ok(())
/// }
/// ```
///
/// # Errors
///
/// Returns [`ObserverError::DatabaseError`] if the URL is invalid, the
/// connection fails or migrations cannot be applied.
pub async fn create_pool(database_url: &str) -> ObserverResult<SqlitePool> {
    info!(database_url, "Connecting to database");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| {
            ObserverError::database(
                format!("Failed to parse database URL: {database_url}"),
                Some(Box::new(e)),
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .map_err(|e| {
            ObserverError::database(
                format!("Failed to connect to database at {database_url}"),
                Some(Box::new(e)),
            )
        })?;

    info!("Running database migrations");
    run_migrations(&pool).await?;
    verify_database(&pool).await?;
    info!("Database migrations complete");

    Ok(pool)
}

/// Applies all pending migrations from the `migrations/` directory.
///
/// # Errors
///
/// Returns [`ObserverError::DatabaseError`] if a migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> ObserverResult<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        ObserverError::database("Failed to run database migrations", Some(Box::new(e)))
    })?;

    Ok(())
}

/// Verify that the checkpoint table exists after migrations.
///
/// # Errors
///
/// Returns [`ObserverError::DatabaseError`] if the schema is incomplete.
pub async fn verify_database(pool: &SqlitePool) -> ObserverResult<()> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'checkpoints'",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| ObserverError::database("Failed to verify database schema", Some(Box::new(e))))?;

    if rows.is_empty() {
        return Err(ObserverError::database(
            "Database schema incomplete: missing 'checkpoints' table",
            None,
        ));
    }

    Ok(())
}

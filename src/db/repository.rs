//! Repository for checkpoint persistence.

use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::models::CheckpointRecord;
use crate::error::{ObserverError, ObserverResult};
use crate::types::BlockHeader;

/// Checkpoint reads and writes over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct CheckpointRepository {
    pool: SqlitePool,
}

impl CheckpointRepository {
    /// Creates a new repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record that `observer` has fully processed `header`.
    ///
    /// Idempotent and non-regressing: saving the same or an older header is
    /// accepted but leaves a newer stored checkpoint untouched. A header at
    /// the same height replaces the stored one.
    ///
    /// Returns `true` if the stored checkpoint changed.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::DatabaseError`] if the write fails.
    #[instrument(skip(self, header), fields(block = header.number))]
    pub async fn save_checkpoint(&self, observer: &str, header: &BlockHeader) -> ObserverResult<bool> {
        let record = CheckpointRecord::new(observer, header)?;

        let result = sqlx::query(
            r"
            INSERT INTO checkpoints (
                observer, block_number, block_hash, parent_hash, block_timestamp, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (observer) DO UPDATE SET
                block_number = excluded.block_number,
                block_hash = excluded.block_hash,
                parent_hash = excluded.parent_hash,
                block_timestamp = excluded.block_timestamp,
                updated_at = excluded.updated_at
            WHERE excluded.block_number >= checkpoints.block_number
            ",
        )
        .bind(&record.observer)
        .bind(record.block_number)
        .bind(&record.block_hash)
        .bind(&record.parent_hash)
        .bind(record.block_timestamp)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ObserverError::database("Failed to save checkpoint", Some(Box::new(e))))?;

        let changed = result.rows_affected() > 0;
        debug!(observer, changed, "Checkpoint saved");
        Ok(changed)
    }

    /// Stored checkpoint of `observer`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::DatabaseError`] if the query fails or the row
    /// is corrupt.
    pub async fn load_checkpoint(&self, observer: &str) -> ObserverResult<Option<BlockHeader>> {
        let record = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT * FROM checkpoints WHERE observer = ?",
        )
        .bind(observer)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ObserverError::database("Failed to query checkpoint", Some(Box::new(e))))?;

        record.as_ref().map(CheckpointRecord::header).transpose()
    }

    /// All stored checkpoints, ordered by observer name.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::DatabaseError`] if the query fails.
    pub async fn list_checkpoints(&self) -> ObserverResult<Vec<CheckpointRecord>> {
        sqlx::query_as::<_, CheckpointRecord>("SELECT * FROM checkpoints ORDER BY observer")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ObserverError::database("Failed to list checkpoints", Some(Box::new(e))))
    }

    /// The least advanced stored checkpoint across all observers.
    ///
    /// Resuming from here replays nothing any observer still needs to skip.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::DatabaseError`] if the query fails or the row
    /// is corrupt.
    pub async fn lowest_checkpoint(&self) -> ObserverResult<Option<BlockHeader>> {
        let record = sqlx::query_as::<_, CheckpointRecord>(
            "SELECT * FROM checkpoints ORDER BY block_number ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ObserverError::database("Failed to query lowest checkpoint", Some(Box::new(e))))?;

        record.as_ref().map(CheckpointRecord::header).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use alloy::primitives::B256;

    async fn setup_test_db() -> CheckpointRepository {
        let pool = create_pool("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        CheckpointRepository::new(pool)
    }

    fn header(number: u64, tag: u8) -> BlockHeader {
        BlockHeader::new(number, B256::repeat_byte(tag), B256::repeat_byte(tag.wrapping_sub(1)), number * 12)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let repo = setup_test_db().await;
        assert!(repo.load_checkpoint("obs").await.expect("query").is_none());

        assert!(repo.save_checkpoint("obs", &header(10, 10)).await.expect("save"));
        assert_eq!(repo.load_checkpoint("obs").await.expect("query"), Some(header(10, 10)));
    }

    #[tokio::test]
    async fn test_checkpoint_never_regresses() {
        let repo = setup_test_db().await;
        repo.save_checkpoint("obs", &header(10, 10)).await.expect("save");

        let changed = repo.save_checkpoint("obs", &header(9, 9)).await.expect("older accepted");
        assert!(!changed);
        assert_eq!(repo.load_checkpoint("obs").await.expect("query"), Some(header(10, 10)));

        // Same height, different hash replaces
        repo.save_checkpoint("obs", &header(10, 0xaa)).await.expect("save");
        assert_eq!(
            repo.load_checkpoint("obs").await.expect("query").map(|h| h.hash),
            Some(B256::repeat_byte(0xaa))
        );
    }

    #[tokio::test]
    async fn test_duplicate_save_is_idempotent() {
        let repo = setup_test_db().await;
        repo.save_checkpoint("obs", &header(5, 5)).await.expect("save");
        repo.save_checkpoint("obs", &header(5, 5)).await.expect("save again");
        assert_eq!(repo.list_checkpoints().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_lowest() {
        let repo = setup_test_db().await;
        repo.save_checkpoint("b", &header(20, 20)).await.expect("save");
        repo.save_checkpoint("a", &header(15, 15)).await.expect("save");

        let all = repo.list_checkpoints().await.expect("list");
        let names: Vec<&str> = all.iter().map(|r| r.observer.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(
            repo.lowest_checkpoint().await.expect("query").map(|h| h.number),
            Some(15)
        );
    }
}

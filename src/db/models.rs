//! Database models that map to SQL tables.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, ObserverResult};
use crate::types::BlockHeader;

/// One observer's last fully processed block.
///
/// Maps to the `checkpoints` table. SQLite has no unsigned 64-bit integer, so
/// numbers are stored as `i64` and hashes as `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CheckpointRecord {
    /// Observer name (primary key)
    pub observer: String,
    /// Block number
    pub block_number: i64,
    /// Block hash (hex string with 0x prefix)
    pub block_hash: String,
    /// Parent block hash (hex string with 0x prefix)
    pub parent_hash: String,
    /// Block timestamp (unix seconds)
    pub block_timestamp: i64,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

impl CheckpointRecord {
    /// Record for `observer` having processed `header`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::DatabaseError`] if the block number or
    /// timestamp does not fit in an `i64`.
    pub fn new(observer: &str, header: &BlockHeader) -> ObserverResult<Self> {
        Ok(Self {
            observer: observer.to_string(),
            block_number: to_sql_int("block number", header.number)?,
            block_hash: format!("{:?}", header.hash),
            parent_hash: format!("{:?}", header.parent_hash),
            block_timestamp: to_sql_int("block timestamp", header.timestamp)?,
            updated_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Parse the stored row back into a header.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::DatabaseError`] if a column holds a value
    /// that is not a valid number or hash.
    pub fn header(&self) -> ObserverResult<BlockHeader> {
        Ok(BlockHeader::new(
            from_sql_int("block_number", self.block_number)?,
            parse_hash("block_hash", &self.block_hash)?,
            parse_hash("parent_hash", &self.parent_hash)?,
            from_sql_int("block_timestamp", self.block_timestamp)?,
        ))
    }
}

fn to_sql_int(field: &str, value: u64) -> ObserverResult<i64> {
    i64::try_from(value).map_err(|e| {
        ObserverError::database(format!("{field} {value} out of range"), Some(Box::new(e)))
    })
}

fn from_sql_int(column: &str, value: i64) -> ObserverResult<u64> {
    u64::try_from(value).map_err(|e| {
        ObserverError::database(format!("Negative value in column {column}: {value}"), Some(Box::new(e)))
    })
}

fn parse_hash(column: &str, value: &str) -> ObserverResult<B256> {
    value.parse().map_err(|e| {
        ObserverError::database(
            format!("Failed to parse {column}: {value}"),
            Some(Box::new(e)),
        )
    })
}

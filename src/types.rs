//! Core data model shared by the router, the observers and the event queue.
//!
//! All types are immutable once observed. They are deliberately decoupled from
//! the RPC representations so that the pipeline can be driven by any
//! [`ChainSource`](crate::chain::ChainSource), including in-memory test doubles.

use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::{Header, Log};
use serde::{Deserialize, Serialize};

/// Metadata identifying a block, without its transactions or logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block number (monotonically increasing per chain)
    pub number: u64,

    /// Block hash
    pub hash: B256,

    /// Parent block hash
    pub parent_hash: B256,

    /// Block timestamp (Unix epoch seconds)
    pub timestamp: u64,
}

impl BlockHeader {
    /// Create a new header manually (useful for testing).
    #[must_use]
    pub const fn new(number: u64, hash: B256, parent_hash: B256, timestamp: u64) -> Self {
        Self {
            number,
            hash,
            parent_hash,
            timestamp,
        }
    }
}

impl From<&Header> for BlockHeader {
    fn from(header: &Header) -> Self {
        Self {
            number: header.number,
            hash: header.hash,
            parent_hash: header.parent_hash,
            timestamp: header.timestamp,
        }
    }
}

impl From<Header> for BlockHeader {
    fn from(header: Header) -> Self {
        Self::from(&header)
    }
}

/// A structured record emitted by a contract execution within a block.
///
/// Forwarded verbatim to the event queue once it passes the observer's
/// contract filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    /// Hash of the originating block
    pub block_hash: B256,

    /// Number of the originating block
    pub block_number: u64,

    /// Emitting contract address
    pub address: Address,

    /// Ordered topic hashes (topic0 is the event signature)
    pub topics: Vec<B256>,

    /// Opaque ABI-encoded payload
    pub data: Bytes,

    /// Position of the log within its block
    pub log_index: u64,

    /// Hash of the emitting transaction, when known
    pub transaction_hash: Option<B256>,
}

impl EventLog {
    /// Convert an RPC log fetched for the block `block_hash`, falling back to
    /// it when the node left the log's own block hash empty.
    #[must_use]
    pub fn from_rpc(log: &Log, block_hash: B256) -> Self {
        Self {
            block_hash: log.block_hash.unwrap_or(block_hash),
            block_number: log.block_number.unwrap_or_default(),
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            log_index: log.log_index.unwrap_or_default(),
            transaction_hash: log.transaction_hash,
        }
    }

    /// Event signature hash, if the log carries any topic.
    #[must_use]
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

/// Set of topic hashes an observer restricts its log retrieval to.
///
/// An empty filter places no topic restriction on the fetched logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicFilter(Vec<B256>);

impl TopicFilter {
    /// Build a filter from topic hashes, dropping duplicates but keeping
    /// first-seen order.
    #[must_use]
    pub fn new(topics: impl IntoIterator<Item = B256>) -> Self {
        let mut unique = Vec::new();
        for topic in topics {
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }
        Self(unique)
    }

    /// Topic hashes of this filter.
    #[must_use]
    pub fn topics(&self) -> &[B256] {
        &self.0
    }

    /// Whether the filter places no restriction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a log's signature topic is admitted by this filter.
    ///
    /// Client-side form of the node's topic match: the HTTP source passes the
    /// topics to `eth_getLogs` instead, while in-memory chain sources apply
    /// this to honor the same contract.
    #[must_use]
    pub fn admits(&self, log: &EventLog) -> bool {
        self.is_empty() || log.signature().is_some_and(|sig| self.0.contains(&sig))
    }
}

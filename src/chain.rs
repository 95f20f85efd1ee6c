//! The chain data source capability the pipeline depends on.
//!
//! The router and the observers only ever see this trait. The production
//! implementation is [`RpcChainSource`](crate::rpc::RpcChainSource); tests drive
//! the pipeline with in-memory doubles.

use std::pin::Pin;

use alloy::primitives::B256;
use async_trait::async_trait;
use futures_util::Stream;

use crate::error::ObserverResult;
use crate::types::{BlockHeader, EventLog};

/// Stream of block headers in chain order.
pub type HeaderStream = Pin<Box<dyn Stream<Item = BlockHeader> + Send>>;

/// Supplier of block headers, block logs and the checkpoint sink.
///
/// Implementations must be safe for concurrent use by the router and every
/// observer.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// All logs of the block with the given hash matching the topic set.
    ///
    /// An empty topic set returns every log of the block. Logs are returned
    /// in log index order.
    async fn block_logs(&self, block_hash: B256, topics: &[B256]) -> ObserverResult<Vec<EventLog>>;

    /// Durably record that `observer` has fully processed `header`.
    ///
    /// Must be idempotent: the same or an older header may be notified again.
    async fn notify_checkpoint(&self, observer: &str, header: &BlockHeader) -> ObserverResult<()>;

    /// Subscribe to new block headers.
    ///
    /// The stream ends when the upstream connection is lost; callers
    /// subscribe again to resume.
    async fn subscribe_headers(&self) -> ObserverResult<HeaderStream>;
}

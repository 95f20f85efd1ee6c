//! HTTP provider for request/response RPC calls.
//!
//! Used for everything that is not a subscription: block log retrieval,
//! header lookups during backfill and head queries.
//!
//! ## Example
//!
//! ```no_run
//! use eth_log_observer::rpc::{create_provider, get_latest_block};
//! use eth_log_observer::error::ObserverResult;
//!
//! # async fn example() -> ObserverResult<()> {
//! let provider = create_provider("https://eth-mainnet.g.alchemy.com/v2/API_KEY").await?;
//! let latest_block = get_latest_block(&provider).await?;
//! println!("Latest block: {}", latest_block);
//! # Ok(())
//! # }
//! ```

use crate::error::{ObserverError, ObserverResult};
use crate::types::{BlockHeader, EventLog};
use alloy::primitives::B256;
use alloy::providers::{Provider as AlloyProvider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockTransactionsKind, Filter};
use alloy::transports::http::{Client, Http};
use tracing::{debug, info, instrument, warn};

/// HTTP provider type.
pub type Provider = RootProvider<Http<Client>>;

/// Host part of an RPC URL, without the API key path.
pub(crate) fn redact(url: &str) -> &str {
    url.split("/v2/").next().unwrap_or("unknown")
}

/// Create a new Ethereum RPC provider connected via HTTP.
///
/// # Errors
///
/// Returns [`ObserverError::RpcError`] if the URL cannot be parsed.
#[allow(clippy::unused_async)]
#[instrument(skip(rpc_url), fields(rpc_host = tracing::field::Empty))]
pub async fn create_provider(rpc_url: &str) -> ObserverResult<Provider> {
    let host = redact(rpc_url);
    tracing::Span::current().record("rpc_host", host);
    debug!(rpc_host = host, "Creating HTTP provider");

    let url = rpc_url.parse().map_err(|e| {
        let msg = if rpc_url.starts_with("http") {
            format!("Failed to parse RPC URL: '{host}'")
        } else {
            format!(
                "Invalid RPC URL: '{host}'. Expected format: 'https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY'"
            )
        };
        ObserverError::rpc(msg, Some(Box::new(e)))
    })?;

    let provider = ProviderBuilder::new().on_http(url);

    info!("RPC provider initialized");
    Ok(provider)
}

/// Get the latest block number.
///
/// # Errors
///
/// Returns [`ObserverError::RpcError`] if the request fails.
#[instrument(skip(provider), fields(block = tracing::field::Empty))]
pub async fn get_latest_block(provider: &Provider) -> ObserverResult<u64> {
    let block_number = provider
        .get_block_number()
        .await
        .map_err(|e| ObserverError::rpc("Failed to fetch latest block number", Some(Box::new(e))))?;

    tracing::Span::current().record("block", block_number);
    debug!(block = block_number, "Latest block fetched");
    Ok(block_number)
}

/// Check that the provider answers by fetching the latest block.
///
/// # Errors
///
/// Returns [`ObserverError::RpcError`] if the node is unreachable.
#[instrument(skip(provider))]
pub async fn check_connection(provider: &Provider) -> ObserverResult<u64> {
    match get_latest_block(provider).await {
        Ok(block) => {
            info!(block, "Connection check successful");
            Ok(block)
        }
        Err(e) => {
            warn!(error = %e, "Connection check failed");
            Err(ObserverError::rpc(
                format!("Provider connection health check failed: {e}"),
                None,
            ))
        }
    }
}

/// Fetch the header of block `number`.
///
/// # Errors
///
/// Returns [`ObserverError::RpcError`] if the request fails or the node does
/// not know the block.
#[instrument(skip(provider))]
pub async fn fetch_header(provider: &Provider, number: u64) -> ObserverResult<BlockHeader> {
    let block = provider
        .get_block_by_number(number.into(), BlockTransactionsKind::Hashes)
        .await
        .map_err(|e| ObserverError::rpc(format!("Failed to fetch block {number}"), Some(Box::new(e))))?
        .ok_or_else(|| ObserverError::rpc(format!("Block {number} not found"), None))?;

    Ok(BlockHeader::from(&block.header))
}

/// Fetch all logs of the block `block_hash` whose signature topic is in
/// `topics` (any topic if empty), in log index order.
///
/// # Errors
///
/// Returns [`ObserverError::RpcError`] if the request fails.
#[instrument(skip(provider, topics), fields(topics = topics.len(), logs = tracing::field::Empty))]
pub async fn fetch_block_logs(
    provider: &Provider,
    block_hash: B256,
    topics: &[B256],
) -> ObserverResult<Vec<EventLog>> {
    let mut filter = Filter::new().at_block_hash(block_hash);
    if !topics.is_empty() {
        filter = filter.event_signature(topics.to_vec());
    }

    let logs = provider.get_logs(&filter).await.map_err(|e| {
        ObserverError::rpc(format!("Failed to fetch logs of block {block_hash}"), Some(Box::new(e)))
    })?;

    let mut events: Vec<EventLog> = logs
        .iter()
        .map(|log| EventLog::from_rpc(log, block_hash))
        .collect();
    events.sort_by_key(|event| event.log_index);

    tracing::Span::current().record("logs", events.len());
    debug!(block_hash = %block_hash, logs = events.len(), "Block logs fetched");
    Ok(events)
}

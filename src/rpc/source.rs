//! The production [`ChainSource`]: alloy RPC for chain data, SQLite for
//! checkpoints.

use std::future::{ready, Future};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy::primitives::B256;
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::http::{check_connection, create_provider, fetch_block_logs, fetch_header, get_latest_block, Provider};
use super::websocket::ReconnectingWebSocket;
use crate::chain::{ChainSource, HeaderStream};
use crate::db::CheckpointRepository;
use crate::error::{ObserverError, ObserverResult};
use crate::types::{BlockHeader, EventLog};

/// Default cap on headers replayed when resuming.
pub const DEFAULT_BACKFILL_MAX_BLOCKS: u64 = 1000;

/// Chain source over an HTTP provider, a WebSocket header subscription and a
/// SQLite checkpoint store.
///
/// Every header subscription resumes where the previous one left off: the
/// headers between the last streamed block (initially the lowest stored
/// checkpoint) and the live head are replayed over HTTP, then the live
/// subscription opens. Headers the live stream skips, whether it lagged or
/// the head moved during the replay, are fetched over HTTP so every block
/// is delivered in order. Delivery is at-least-once.
pub struct RpcChainSource {
    http: Provider,
    ws: Arc<Mutex<ReconnectingWebSocket>>,
    checkpoints: CheckpointRepository,
    backfill_max_blocks: u64,
    /// Next block number to stream; 0 starts at the live head.
    resume_at: Arc<AtomicU64>,
}

impl RpcChainSource {
    /// Connect both providers and load the resume point.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::RpcError`] if the HTTP node is unreachable,
    /// [`ObserverError::WebSocketConnectionError`] if the WebSocket cannot be
    /// connected, and [`ObserverError::DatabaseError`] if the stored
    /// checkpoints cannot be read.
    #[instrument(skip_all)]
    pub async fn connect(
        rpc_url: &str,
        ws_url: &str,
        pool: SqlitePool,
        backfill_max_blocks: u64,
    ) -> ObserverResult<Self> {
        let http = create_provider(rpc_url).await?;
        check_connection(&http).await?;

        let mut ws = ReconnectingWebSocket::new(ws_url);
        ws.connect().await.map_err(|e| {
            ObserverError::websocket_connection("Failed to connect WebSocket provider", Some(e.into()))
        })?;

        let checkpoints = CheckpointRepository::new(pool);
        let resume_at = match checkpoints.lowest_checkpoint().await? {
            Some(header) => {
                info!(block = header.number, "Resuming after stored checkpoint");
                header.number.saturating_add(1)
            }
            None => {
                info!("No stored checkpoint, starting at live head");
                0
            }
        };

        Ok(Self {
            http,
            ws: Arc::new(Mutex::new(ws)),
            checkpoints,
            backfill_max_blocks,
            resume_at: Arc::new(AtomicU64::new(resume_at)),
        })
    }

    /// Checkpoint repository backing this source.
    #[must_use]
    pub const fn checkpoints(&self) -> &CheckpointRepository {
        &self.checkpoints
    }

    /// Headers to replay before the live stream: `from..=head`, capped to the
    /// newest `backfill_max_blocks`.
    async fn backfill_range(&self) -> ObserverResult<Option<(u64, u64)>> {
        let from = self.resume_at.load(Ordering::SeqCst);
        if from == 0 || self.backfill_max_blocks == 0 {
            return Ok(None);
        }

        let head = get_latest_block(&self.http).await?;
        if head < from {
            return Ok(None);
        }

        let capped = head.saturating_sub(self.backfill_max_blocks - 1).max(from);
        if capped > from {
            warn!(
                from,
                to = capped - 1,
                "Resume gap exceeds backfill limit, skipping oldest blocks"
            );
        }
        Ok(Some((capped, head)))
    }
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn block_logs(&self, block_hash: B256, topics: &[B256]) -> ObserverResult<Vec<EventLog>> {
        fetch_block_logs(&self.http, block_hash, topics).await
    }

    async fn notify_checkpoint(&self, observer: &str, header: &BlockHeader) -> ObserverResult<()> {
        self.checkpoints.save_checkpoint(observer, header).await?;
        Ok(())
    }

    async fn subscribe_headers(&self) -> ObserverResult<HeaderStream> {
        let resume_at = Arc::clone(&self.resume_at);
        let track = move |header: &BlockHeader| {
            resume_at.store(header.number.saturating_add(1), Ordering::SeqCst);
        };
        let http = self.http.clone();
        let fetch = move |number: u64| {
            let http = http.clone();
            async move { fetch_header(&http, number).await }
        };

        let Some((from, to)) = self.backfill_range().await? else {
            let live = self.ws.lock().await.subscribe_headers().await.map_err(|e| {
                ObserverError::websocket_subscription("Failed to subscribe to block headers", Some(e.into()))
            })?;
            let next = self.resume_at.load(Ordering::SeqCst);
            return Ok(Box::pin(
                fill_gaps(live, next, self.backfill_max_blocks, fetch).inspect(track),
            ));
        };

        info!(from, to, "Replaying headers before live subscription");
        let replay = stream::iter(from..=to)
            .then(fetch.clone())
            .filter_map(|fetched| {
                ready(match fetched {
                    Ok(header) => Some(header),
                    Err(e) => {
                        warn!(error = %e, "Skipping header that could not be replayed");
                        None
                    }
                })
            });

        // Subscribe only once the replay is drained so no live header waits
        // unpolled behind it.
        let ws = Arc::clone(&self.ws);
        let live = stream::once(async move { ws.lock().await.subscribe_headers().await })
            .filter_map(|subscribed| {
                ready(match subscribed {
                    Ok(headers) => Some(headers),
                    Err(e) => {
                        error!(error = %e, "Failed to subscribe to block headers after replay");
                        None
                    }
                })
            })
            .flatten();
        let live = fill_gaps(live, to.saturating_add(1), self.backfill_max_blocks, fetch);

        Ok(Box::pin(replay.chain(live).inspect(track)))
    }
}

/// Pass live headers through, fetching any headers the live stream skipped.
///
/// `next` is the first block number not yet delivered, 0 when unknown.
/// Headers below the last delivered one are dropped; a repeat of the last one
/// passes. Per gap at most `max_fill` headers are fetched, the newest ones.
fn fill_gaps<S, F, Fut>(
    live: S,
    mut next: u64,
    max_fill: u64,
    fetch: F,
) -> impl Stream<Item = BlockHeader> + Send + 'static
where
    S: Stream<Item = BlockHeader> + Send + 'static,
    F: Fn(u64) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ObserverResult<BlockHeader>> + Send + 'static,
{
    live.then(move |header| {
        let stale = next > 0 && header.number.saturating_add(1) < next;
        let missing = if next > 0 && max_fill > 0 && header.number > next {
            let from = header.number.saturating_sub(max_fill).max(next);
            if from > next {
                warn!(from = next, to = from - 1, "Live gap exceeds backfill limit, skipping oldest blocks");
            }
            Some(from..header.number)
        } else {
            None
        };
        if !stale {
            next = next.max(header.number.saturating_add(1));
        }

        let fetch = fetch.clone();
        async move {
            if stale {
                debug!(block = header.number, "Dropping stale live header");
                return Vec::new();
            }

            let mut headers = Vec::new();
            if let Some(range) = missing {
                warn!(from = range.start, to = range.end - 1, "Live stream skipped headers, fetching them");
                for number in range {
                    match fetch(number).await {
                        Ok(filled) => headers.push(filled),
                        Err(e) => warn!(block = number, error = %e, "Skipping header that could not be fetched"),
                    }
                }
            }
            headers.push(header);
            headers
        }
    })
    .flat_map(stream::iter)
}

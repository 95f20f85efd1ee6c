//! WebSocket provider for the live block-header subscription.
//!
//! Headers arrive push-based over the WebSocket; logs are then fetched per
//! block over HTTP. One subscription serves every observer through the
//! router, so no block is missed because an observer subscribed late.
//!
//! Errors at this edge are `eyre` reports; the chain source maps them into
//! [`ObserverError`](crate::error::ObserverError).

use std::time::Duration;

use alloy::{
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::BoxTransport,
};
use eyre::Result;
use futures_util::stream::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use super::http::redact;
use crate::backoff::Backoff;
use crate::chain::HeaderStream;
use crate::types::BlockHeader;

/// WebSocket provider for real-time header subscriptions.
///
/// # Example
///
/// ```no_run
/// use eth_log_observer::rpc::websocket::WebSocketProvider;
/// use futures_util::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ws = WebSocketProvider::connect("wss://eth-mainnet.g.alchemy.com/v2/YOUR_KEY").await?;
///     let mut headers = ws.subscribe_headers().await?;
///
///     while let Some(header) = headers.next().await {
///         println!("New block: {}", header.number);
///     }
///     Ok(())
/// }
/// ```
pub struct WebSocketProvider {
    provider: RootProvider<BoxTransport>,
    url: String,
}

impl WebSocketProvider {
    /// Connects to a WebSocket RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the connection fails.
    #[instrument(skip(ws_url), fields(ws_host = tracing::field::Empty, duration_ms = tracing::field::Empty))]
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let host = redact(ws_url);
        tracing::Span::current().record("ws_host", host);
        info!(ws_host = host, "Connecting to WebSocket");

        let start = std::time::Instant::now();
        let provider = ProviderBuilder::new().on_builtin(ws_url).await.map_err(|e| {
            error!(error = %e, ws_host = host, "WebSocket connection failed");
            eyre::eyre!("WebSocket connection failed: {}", e)
        })?;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::Span::current().record("duration_ms", duration_ms);
        info!(ws_host = host, duration_ms, "WebSocket connected");

        Ok(Self {
            provider,
            url: ws_url.to_string(),
        })
    }

    /// Returns the WebSocket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Subscribes to new block headers.
    ///
    /// The stream ends when the WebSocket disconnects.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription request fails.
    #[instrument(skip(self))]
    pub async fn subscribe_headers(&self) -> Result<HeaderStream> {
        let sub = self.provider.subscribe_blocks().await.map_err(|e| {
            error!(error = %e, "Block subscription failed");
            eyre::eyre!("Block subscription failed: {}", e)
        })?;

        info!("Block subscription active");
        let headers = sub.into_stream().map(|header| BlockHeader::from(&header));
        Ok(Box::pin(headers))
    }
}

/// WebSocket connection with bounded, backed-off reconnection.
pub struct ReconnectingWebSocket {
    url: String,
    provider: Option<WebSocketProvider>,
    max_reconnect_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl ReconnectingWebSocket {
    /// Default settings: 10 attempts, 1 second initial delay, 60 second cap,
    /// ±25% jitter.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_settings(url, 10, Duration::from_secs(1), Duration::from_secs(60))
    }

    /// Custom retry settings.
    #[must_use]
    pub fn with_settings(
        url: impl Into<String>,
        max_reconnect_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            provider: None,
            max_reconnect_attempts: max_reconnect_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Connects, retrying with exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns error once the attempts are exhausted.
    pub async fn connect(&mut self) -> Result<()> {
        let mut backoff = Backoff::new(self.initial_delay, self.max_delay);
        let mut attempt = 0;

        loop {
            match WebSocketProvider::connect(&self.url).await {
                Ok(provider) => {
                    self.provider = Some(provider);
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_reconnect_attempts {
                        error!(attempts = attempt, "Max reconnection attempts reached");
                        return Err(eyre::eyre!("Failed to connect after {} attempts: {}", attempt, e));
                    }

                    let delay = backoff.next_delay();
                    warn!(
                        attempt,
                        max_attempts = self.max_reconnect_attempts,
                        error = %e,
                        delay_ms = delay.as_millis(),
                        "WebSocket connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Drops the current connection and connects again.
    ///
    /// # Errors
    ///
    /// Returns error once the attempts are exhausted.
    pub async fn reconnect(&mut self) -> Result<()> {
        warn!("Reconnecting WebSocket");
        self.provider = None;
        self.connect().await
    }

    /// Subscribe to headers, reconnecting first if needed or if the current
    /// connection refuses the subscription.
    ///
    /// # Errors
    ///
    /// Returns error if no connection can be established or the fresh
    /// connection refuses the subscription as well.
    pub async fn subscribe_headers(&mut self) -> Result<HeaderStream> {
        if let Some(provider) = &self.provider {
            match provider.subscribe_headers().await {
                Ok(stream) => return Ok(stream),
                Err(e) => debug!(error = %e, "Subscription on existing connection failed"),
            }
        }

        self.reconnect().await?;
        match &self.provider {
            Some(provider) => provider.subscribe_headers().await,
            None => Err(eyre::eyre!("WebSocket not connected")),
        }
    }

    /// Checks if currently connected.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns the WebSocket URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

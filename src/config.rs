//! Configuration management for the block observer pipeline.
//!
//! Configuration is read from environment variables (after loading `.env`
//! with `dotenvy`). All operations return [`ObserverResult`].
//!
//! ## Environment Variables
//!
//! Required:
//! - `RPC_URL` and `RPC_WS_URL`, or `ALCHEMY_API_KEY` to derive both
//! - `WATCH_CONTRACTS`: comma-separated contract addresses of interest
//!
//! Optional (with defaults):
//! - `DATABASE_URL`: checkpoint database (default: `sqlite:./observer.db`)
//! - `OBSERVER_NAME`: observer identity and checkpoint key (default: `block observer`)
//! - `WATCH_TOPICS`: comma-separated 32-byte topic hashes (default: any topic)
//! - `EVENT_QUEUE_CAPACITY`: events buffered for consumers (default: 1000)
//! - `CHECKPOINT_INTERVAL_SECS`: checkpoint notification interval (default: 5)
//! - `ROUTER_BUFFER`: headers buffered per router subscriber (default: 16)
//! - `FETCH_TIMEOUT_SECS`: per log fetch timeout (default: none)
//! - `SHUTDOWN_TIMEOUT_SECS`: shutdown wait, 0 waits forever (default: 30)
//! - `BACKFILL_MAX_BLOCKS`: headers replayed on resume (default: 1000)
//!
//! ## Example
//!
//! ```no_run
//! use eth_log_observer::config::Config;
//! use eth_log_observer::error::ObserverResult;
//!
//! # fn main() -> ObserverResult<()> {
//! let config = Config::from_env()?;
//! println!("Watching {} contracts", config.watch_contracts().len());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, B256};

use crate::error::{ObserverError, ObserverResult};
use crate::rpc::DEFAULT_BACKFILL_MAX_BLOCKS;
use crate::svc::{
    ObserverConfig, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_ROUTER_BUFFER,
};
use crate::types::TopicFilter;

const DEFAULT_DATABASE_URL: &str = "sqlite:./observer.db";
const DEFAULT_OBSERVER_NAME: &str = "block observer";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration of the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP RPC endpoint
    rpc_url: String,

    /// WebSocket RPC endpoint
    ws_url: String,

    /// Checkpoint database URL
    database_url: String,

    /// Observer name
    observer_name: String,

    /// Contracts of interest
    watch_contracts: Vec<Address>,

    /// Topic restriction for log retrieval
    watch_topics: TopicFilter,

    /// Event queue capacity
    event_queue_capacity: usize,

    /// Checkpoint notification interval
    checkpoint_interval: Duration,

    /// Headers buffered per router subscriber
    router_buffer: usize,

    /// Per log fetch timeout
    fetch_timeout: Option<Duration>,

    /// Shutdown wait; `None` waits forever
    shutdown_timeout: Option<Duration>,

    /// Headers replayed on resume
    backfill_max_blocks: u64,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Loads `.env` if present, then delegates to [`Self::from_vars`].
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ConfigError`] naming the offending variable if
    /// a required variable is missing or a value is invalid.
    pub fn from_env() -> ObserverResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ConfigError`] naming the offending variable if
    /// a required variable is missing or a value is invalid.
    pub fn from_vars<F>(lookup: F) -> ObserverResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = var("ALCHEMY_API_KEY").filter(|key| key != "your_alchemy_api_key_here");
        let rpc_url = var("RPC_URL")
            .or_else(|| api_key.as_ref().map(|key| format!("https://eth-mainnet.g.alchemy.com/v2/{key}")))
            .ok_or_else(|| ObserverError::config("RPC_URL or ALCHEMY_API_KEY must be set", None))?;
        let ws_url = var("RPC_WS_URL")
            .or_else(|| api_key.as_ref().map(|key| format!("wss://eth-mainnet.g.alchemy.com/v2/{key}")))
            .ok_or_else(|| ObserverError::config("RPC_WS_URL or ALCHEMY_API_KEY must be set", None))?;

        if !rpc_url.starts_with("http") {
            return Err(ObserverError::config(
                "RPC_URL must be an http(s) URL",
                None,
            ));
        }
        if !ws_url.starts_with("ws") {
            return Err(ObserverError::config(
                "RPC_WS_URL must be a ws(s) URL",
                None,
            ));
        }

        let watch_contracts: Vec<Address> = match var("WATCH_CONTRACTS") {
            Some(raw) => parse_list(&raw, "WATCH_CONTRACTS")?,
            None => {
                return Err(ObserverError::config(
                    "WATCH_CONTRACTS environment variable is required",
                    None,
                ))
            }
        };
        if watch_contracts.is_empty() {
            return Err(ObserverError::config(
                "WATCH_CONTRACTS must name at least one contract address",
                None,
            ));
        }

        let watch_topics = match var("WATCH_TOPICS") {
            Some(raw) => TopicFilter::new(parse_list::<B256>(&raw, "WATCH_TOPICS")?),
            None => TopicFilter::default(),
        };

        let event_queue_capacity = positive(
            parse_or(var("EVENT_QUEUE_CAPACITY"), "EVENT_QUEUE_CAPACITY", DEFAULT_EVENT_QUEUE_CAPACITY)?,
            "EVENT_QUEUE_CAPACITY",
        )?;
        let checkpoint_interval = Duration::from_secs(positive(
            parse_or(
                var("CHECKPOINT_INTERVAL_SECS"),
                "CHECKPOINT_INTERVAL_SECS",
                DEFAULT_CHECKPOINT_INTERVAL.as_secs(),
            )?,
            "CHECKPOINT_INTERVAL_SECS",
        )?);
        let router_buffer = positive(
            parse_or(var("ROUTER_BUFFER"), "ROUTER_BUFFER", DEFAULT_ROUTER_BUFFER)?,
            "ROUTER_BUFFER",
        )?;

        let fetch_timeout = match var("FETCH_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(positive(
                parse_value(&raw, "FETCH_TIMEOUT_SECS")?,
                "FETCH_TIMEOUT_SECS",
            )?)),
            None => None,
        };

        let shutdown_secs = parse_or(
            var("SHUTDOWN_TIMEOUT_SECS"),
            "SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        )?;
        let shutdown_timeout = (shutdown_secs > 0).then(|| Duration::from_secs(shutdown_secs));

        Ok(Self {
            rpc_url,
            ws_url,
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            observer_name: var("OBSERVER_NAME").unwrap_or_else(|| DEFAULT_OBSERVER_NAME.to_string()),
            watch_contracts,
            watch_topics,
            event_queue_capacity,
            checkpoint_interval,
            router_buffer,
            fetch_timeout,
            shutdown_timeout,
            backfill_max_blocks: parse_or(
                var("BACKFILL_MAX_BLOCKS"),
                "BACKFILL_MAX_BLOCKS",
                DEFAULT_BACKFILL_MAX_BLOCKS,
            )?,
        })
    }

    /// Observer settings derived from this configuration.
    #[must_use]
    pub fn observer_config(&self) -> ObserverConfig {
        ObserverConfig::new(&self.observer_name)
            .with_topics(self.watch_topics.clone())
            .with_queue_capacity(self.event_queue_capacity)
            .with_checkpoint_interval(self.checkpoint_interval)
            .with_fetch_timeout(self.fetch_timeout)
    }

    /// Get the HTTP RPC URL.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Get the WebSocket RPC URL.
    #[must_use]
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Get the checkpoint database URL.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Get the observer name.
    #[must_use]
    pub fn observer_name(&self) -> &str {
        &self.observer_name
    }

    /// Get the contracts of interest.
    #[must_use]
    pub fn watch_contracts(&self) -> &[Address] {
        &self.watch_contracts
    }

    /// Get the topic restriction.
    #[must_use]
    pub const fn watch_topics(&self) -> &TopicFilter {
        &self.watch_topics
    }

    /// Get the event queue capacity.
    #[must_use]
    pub const fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
    }

    /// Get the checkpoint interval.
    #[must_use]
    pub const fn checkpoint_interval(&self) -> Duration {
        self.checkpoint_interval
    }

    /// Get the per-subscriber router buffer.
    #[must_use]
    pub const fn router_buffer(&self) -> usize {
        self.router_buffer
    }

    /// Get the log fetch timeout, if any.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    /// Get the shutdown timeout; `None` waits forever.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout
    }

    /// Get the backfill limit.
    #[must_use]
    pub const fn backfill_max_blocks(&self) -> u64 {
        self.backfill_max_blocks
    }
}

fn parse_value<T>(raw: &str, key: &str) -> ObserverResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|e| {
        ObserverError::config(format!("{key} has an invalid value: '{raw}'"), Some(Box::new(e)))
    })
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> ObserverResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map_or(Ok(default), |raw| parse_value(&raw, key))
}

fn parse_list<T>(raw: &str, key: &str) -> ObserverResult<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_value(item, key))
        .collect()
}

fn positive<T>(value: T, key: &str) -> ObserverResult<T>
where
    T: PartialOrd + Default,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ObserverError::config(format!("{key} must be greater than zero"), None))
    }
}

//! # Ethereum Block Observer
//!
//! Ingestion pipeline that keeps derived state current with chain activity,
//! built on [Alloy](https://github.com/alloy-rs/alloy) and Tokio.
//!
//! ## Pipeline
//!
//! ```text
//! ChainSource ──► BlockRouter ──► BlockObserver(s) ──► EventQueue ──► consumers
//! ```
//!
//! - The [`BlockRouter`](svc::BlockRouter) holds the single upstream header
//!   subscription and fans it out, in order, to every observer.
//! - Each [`BlockObserver`](svc::BlockObserver) fetches the logs of every
//!   header it receives, keeps those from contracts of interest and pushes
//!   them onto its bounded [`EventQueue`](svc::EventQueue). Progress is
//!   checkpointed on a fixed interval.
//! - The [`ServiceManager`](svc::ServiceManager) registers running services
//!   and shuts them down in an orderly way.
//!
//! Delivery to downstream consumers is at-least-once: after a restart, blocks
//! processed since the last checkpoint are processed again.
//!
//! ## Using as a Library
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eth_log_observer::chain::ChainSource;
//! use eth_log_observer::config::Config;
//! use eth_log_observer::db::create_pool;
//! use eth_log_observer::rpc::RpcChainSource;
//! use eth_log_observer::svc::{BlockObserver, BlockRouter, ServiceManager, WatchList};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let pool = create_pool(config.database_url()).await?;
//!     let source: Arc<dyn ChainSource> = Arc::new(
//!         RpcChainSource::connect(config.rpc_url(), config.ws_url(), pool, 1000).await?,
//!     );
//!
//!     let manager = Arc::new(ServiceManager::new());
//!     let mut router = BlockRouter::new(config.router_buffer())?;
//!     let filter = Arc::new(WatchList::new(config.watch_contracts().iter().copied()));
//!     let (observer, events) = BlockObserver::new(config.observer_config(), Arc::clone(&source), filter)?;
//!
//!     observer.start(&mut router, Arc::clone(&manager))?;
//!     router.start(source, Arc::clone(&manager))?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{} emitted a log in block {}", event.address, event.block_number);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Construction and configuration return [`error::ObserverResult<T>`]. Failures
//! inside the running pipeline (log fetches, checkpoint writes) are logged and
//! absorbed; the event queue and the checkpoint stream are its only outputs.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod backoff;
pub mod chain;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod observability;
pub mod reorg;
pub mod rpc;
pub mod svc;
pub mod types;

//! RPC provider management for Ethereum connections.
//!
//! # Provider Types
//!
//! - **HTTP Provider** ([`http`]): log retrieval and header lookups
//! - **WebSocket Provider** ([`websocket`]): live header subscription with
//!   backed-off reconnection
//! - **Chain source** ([`source`]): both providers plus the checkpoint store
//!   behind the [`ChainSource`](crate::chain::ChainSource) trait
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           RpcChainSource            │
//! └─────────────────────────────────────┘
//!      │               │             │
//! ┌────▼────┐     ┌────▼────┐   ┌────▼─────┐
//! │  HTTP   │     │   WS    │   │  SQLite  │
//! │Provider │     │Provider │   │checkpoint│
//! └─────────┘     └─────────┘   └──────────┘
//!  block logs,    new headers    notify sink
//!  backfill
//! ```

pub mod http;
pub mod source;
pub mod websocket;

pub use http::{check_connection, create_provider, fetch_block_logs, fetch_header, get_latest_block, Provider};
pub use source::{RpcChainSource, DEFAULT_BACKFILL_MAX_BLOCKS};
pub use websocket::{ReconnectingWebSocket, WebSocketProvider};

//! The ingestion pipeline services.
//!
//! ```text
//! ChainSource ──► BlockRouter ──► BlockObserver ──► EventQueue ──► consumers
//!                      │               │
//!                      └──── ServiceManager (registry, shutdown) ────┘
//! ```
//!
//! - [`ServiceManager`]: registry of running services and coordinated shutdown
//! - [`BlockRouter`]: single upstream header subscription fanned out per observer
//! - [`BlockObserver`]: log retrieval, contract filtering, event forwarding and
//!   periodic checkpoint notification
//! - [`EventQueue`]: bounded FIFO hand-off to downstream consumers

pub mod filter;
pub mod lifecycle;
pub mod manager;
pub mod observer;
pub mod queue;
pub mod router;

pub use filter::{ContractFilter, WatchList};
pub use lifecycle::{ServiceHandle, ServiceState, StopListener, StopSignal};
pub use manager::{Service, ServiceManager};
pub use observer::{BlockObserver, ObserverConfig, DEFAULT_CHECKPOINT_INTERVAL};
pub use queue::{EventQueue, EventReceiver, EventSender, DEFAULT_EVENT_QUEUE_CAPACITY};
pub use router::{BlockRouter, HeaderReceiver, DEFAULT_ROUTER_BUFFER};

//! Fan-out of the upstream header stream to every subscribed observer.
//!
//! The router holds the only upstream subscription. Each subscriber gets its
//! own bounded channel; delivery to a full channel blocks the router, so one
//! slow observer delays the others (head-of-line blocking). Observers are
//! expected to be the bottleneck, not the router.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::lifecycle::{CloseGuard, Lifecycle, ServiceHandle, ServiceState, StopListener};
use super::manager::ServiceManager;
use crate::backoff::Backoff;
use crate::chain::ChainSource;
use crate::error::{ObserverError, ObserverResult};
use crate::reorg::ReorgDetector;
use crate::types::BlockHeader;

/// Receiving end of a router subscription.
pub type HeaderReceiver = mpsc::Receiver<BlockHeader>;

/// Default per-subscriber header buffer.
pub const DEFAULT_ROUTER_BUFFER: usize = 16;

struct Subscriber {
    id: usize,
    tx: mpsc::Sender<BlockHeader>,
    last_delivered: Option<u64>,
}

/// Subscribes once to the chain's header stream and fans it out.
pub struct BlockRouter {
    name: String,
    buffer: usize,
    backoff: Backoff,
    subscribers: Vec<Subscriber>,
    next_id: usize,
}

impl BlockRouter {
    /// Create a router whose subscriber channels each buffer `buffer` headers.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ConfigError`] if `buffer` is zero.
    pub fn new(buffer: usize) -> ObserverResult<Self> {
        if buffer == 0 {
            return Err(ObserverError::config("router buffer must be positive", None));
        }

        Ok(Self {
            name: "block router".to_string(),
            buffer,
            backoff: Backoff::new(Duration::from_secs(1), Duration::from_secs(30)),
            subscribers: Vec::new(),
            next_id: 0,
        })
    }

    /// Name the router registers under.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Re-subscription backoff bounds.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff = Backoff::new(initial, max);
        self
    }

    /// Name the router registers under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// New subscription receiving every header from now on, in arrival order.
    pub fn subscribe(&mut self) -> HeaderReceiver {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers.push(Subscriber {
            id: self.next_id,
            tx,
            last_delivered: None,
        });
        self.next_id += 1;
        rx
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register with the manager and start routing in a background task.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ServiceError`] if the name is already registered.
    pub fn start(
        self,
        source: Arc<dyn ChainSource>,
        manager: Arc<ServiceManager>,
    ) -> ObserverResult<(ServiceHandle, JoinHandle<()>)> {
        let lifecycle = Lifecycle::new(&self.name);
        let handle = lifecycle.handle();
        manager.add(Arc::new(handle.clone()))?;

        lifecycle.set(ServiceState::Running);
        let guard = lifecycle.close_guard(manager);
        let task = tokio::spawn(self.run(source, lifecycle, guard));
        Ok((handle, task))
    }

    async fn run(mut self, source: Arc<dyn ChainSource>, lifecycle: Lifecycle, _guard: CloseGuard) {
        let mut stop = lifecycle.listener();
        let mut detector = ReorgDetector::new();

        if self.subscribers.is_empty() {
            warn!(router = %self.name, "Router started without subscribers");
        }
        info!(router = %self.name, subscribers = self.subscribers.len(), "Block router running");

        'routing: loop {
            let subscribed = tokio::select! {
                () = stop.stopped() => break,
                result = source.subscribe_headers() => result,
            };

            match subscribed {
                Ok(mut headers) => {
                    info!(router = %self.name, "Header subscription active");
                    loop {
                        let next = tokio::select! {
                            () = stop.stopped() => break 'routing,
                            next = headers.next() => next,
                        };
                        let Some(header) = next else {
                            warn!(router = %self.name, "Header stream ended");
                            break;
                        };

                        self.backoff.reset();
                        detector.observe(&header);
                        if !self.dispatch(&header, &mut stop).await {
                            break 'routing;
                        }
                    }
                }
                Err(e) => {
                    error!(router = %self.name, error = %e, "Header subscription failed");
                }
            }

            if !self.pause(&mut stop).await {
                break;
            }
        }

        lifecycle.set(ServiceState::Stopping);
        info!(
            router = %self.name,
            reorgs = detector.reorg_count(),
            "Block router stopped"
        );
    }

    /// Wait out the next backoff delay. `false` if stopped meanwhile.
    async fn pause(&mut self, stop: &mut StopListener) -> bool {
        let delay = self.backoff.next_delay();
        info!(router = %self.name, delay_ms = delay.as_millis(), "Re-subscribing after delay");

        tokio::select! {
            () = stop.stopped() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Deliver one header to every subscriber. `false` if stopped meanwhile.
    async fn dispatch(&mut self, header: &BlockHeader, stop: &mut StopListener) -> bool {
        let mut index = 0;
        while index < self.subscribers.len() {
            let subscriber = &mut self.subscribers[index];

            if subscriber.last_delivered.is_some_and(|last| header.number < last) {
                warn!(
                    router = %self.name,
                    subscriber = subscriber.id,
                    block = header.number,
                    last = ?subscriber.last_delivered,
                    "Dropping out-of-order header"
                );
                index += 1;
                continue;
            }

            let delivered = tokio::select! {
                () = stop.stopped() => return false,
                sent = subscriber.tx.send(header.clone()) => sent.is_ok(),
            };

            if delivered {
                subscriber.last_delivered = Some(header.number);
                index += 1;
            } else {
                debug!(router = %self.name, subscriber = subscriber.id, "Subscriber gone, removing");
                self.subscribers.remove(index);
            }
        }
        true
    }
}

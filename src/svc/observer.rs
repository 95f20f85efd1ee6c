//! The block observer: per-subscription log extraction and checkpointing.
//!
//! An observer runs as a single task multiplexing three event sources:
//!
//! - **stop**: leave the loop, flush the checkpoint, report closure
//! - **tick**: notify the chain source of the checkpoint if it moved
//! - **header**: fetch the block's logs, filter them, push matches
//!
//! None of the three has priority over the others. A push into a full event
//! queue is raced against stop, so a stop request is honored even while
//! downstream consumers are stalled. The events of a block abandoned that way
//! are never emitted and the block is not checkpointed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::filter::ContractFilter;
use super::lifecycle::{CloseGuard, Lifecycle, ServiceHandle, ServiceState, StopListener};
use super::manager::ServiceManager;
use super::queue::{EventQueue, EventReceiver, EventSender, DEFAULT_EVENT_QUEUE_CAPACITY};
use super::router::{BlockRouter, HeaderReceiver};
use crate::chain::ChainSource;
use crate::error::{ObserverError, ObserverResult};
use crate::types::{BlockHeader, EventLog, TopicFilter};

/// Default interval between checkpoint notifications.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(5);

/// Settings fixed for an observer's lifetime.
#[derive(Debug, Clone)]
pub struct ObserverConfig {
    name: String,
    topics: TopicFilter,
    queue_capacity: usize,
    checkpoint_interval: Duration,
    fetch_timeout: Option<Duration>,
}

impl ObserverConfig {
    /// Defaults: no topic restriction, queue of 1000, 5 second checkpoints,
    /// no fetch timeout.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topics: TopicFilter::default(),
            queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            fetch_timeout: None,
        }
    }

    /// Restrict log retrieval to these topics.
    #[must_use]
    pub fn with_topics(mut self, topics: TopicFilter) -> Self {
        self.topics = topics;
        self
    }

    /// Capacity of the observer's event queue.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Interval between checkpoint notifications.
    #[must_use]
    pub const fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Treat log fetches slower than `timeout` as failures. `None` waits forever.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Observer name, also its registry identity and checkpoint key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic restriction applied when fetching logs.
    #[must_use]
    pub const fn topics(&self) -> &TopicFilter {
        &self.topics
    }

    /// Event queue capacity.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Checkpoint notification interval.
    #[must_use]
    pub const fn checkpoint_interval(&self) -> Duration {
        self.checkpoint_interval
    }

    /// Per-fetch timeout, if any.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }
}

/// What became of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// All matching events pushed; header is the new checkpoint candidate
    Processed { emitted: usize },
    /// Log fetch failed; block skipped without checkpointing
    Skipped,
    /// Stop arrived mid-block; remaining events dropped
    Abandoned,
    /// Every event consumer is gone
    Disconnected,
}

/// Consumes headers, forwards logs of interest and checkpoints progress.
pub struct BlockObserver {
    config: ObserverConfig,
    source: Arc<dyn ChainSource>,
    filter: Arc<dyn ContractFilter>,
    events: EventSender,
    checkpoint: Option<BlockHeader>,
    pending: bool,
}

impl BlockObserver {
    /// Create an observer and the consuming end of its event queue.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ConfigError`] for a zero checkpoint interval
    /// and [`ObserverError::QueueError`] for a zero queue capacity.
    pub fn new(
        config: ObserverConfig,
        source: Arc<dyn ChainSource>,
        filter: Arc<dyn ContractFilter>,
    ) -> ObserverResult<(Self, EventReceiver)> {
        if config.checkpoint_interval.is_zero() {
            return Err(ObserverError::config(
                format!("observer '{}': checkpoint interval must be positive", config.name),
                None,
            ));
        }

        let (events, receiver) = EventQueue::bounded(config.queue_capacity)?;
        let observer = Self {
            config,
            source,
            filter,
            events,
            checkpoint: None,
            pending: false,
        };
        Ok((observer, receiver))
    }

    /// Observer name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Subscribe to `router`, register with the manager and start running.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ServiceError`] if the name is already registered.
    pub fn start(
        self,
        router: &mut BlockRouter,
        manager: Arc<ServiceManager>,
    ) -> ObserverResult<(ServiceHandle, JoinHandle<()>)> {
        let input = router.subscribe();
        self.start_with_input(input, manager)
    }

    /// Like [`Self::start`], reading headers from an existing subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ServiceError`] if the name is already registered.
    pub fn start_with_input(
        self,
        input: HeaderReceiver,
        manager: Arc<ServiceManager>,
    ) -> ObserverResult<(ServiceHandle, JoinHandle<()>)> {
        let lifecycle = Lifecycle::new(&self.config.name);
        let handle = lifecycle.handle();
        manager.add(Arc::new(handle.clone()))?;

        lifecycle.set(ServiceState::Running);
        let guard = lifecycle.close_guard(manager);
        let task = tokio::spawn(self.run(input, lifecycle, guard));
        Ok((handle, task))
    }

    async fn run(mut self, mut input: HeaderReceiver, lifecycle: Lifecycle, _guard: CloseGuard) {
        let mut stop = lifecycle.listener();
        let period = self.config.checkpoint_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            observer = %self.config.name,
            topics = self.config.topics.topics().len(),
            capacity = self.config.queue_capacity,
            "Block observer running"
        );

        let mut forwarded = 0;
        loop {
            tokio::select! {
                () = stop.stopped() => break,
                _ = ticker.tick() => self.notify().await,
                next = input.recv() => {
                    let Some(header) = next else {
                        info!(observer = %self.config.name, "Header input closed");
                        break;
                    };
                    match self.process(&header, &mut stop).await {
                        Outcome::Processed { emitted } => forwarded += emitted,
                        Outcome::Skipped => {}
                        Outcome::Abandoned | Outcome::Disconnected => break,
                    }
                }
            }
        }

        lifecycle.set(ServiceState::Stopping);
        self.notify().await;
        info!(
            observer = %self.config.name,
            checkpoint = ?self.checkpoint.as_ref().map(|h| h.number),
            forwarded,
            "Block observer stopped"
        );
    }

    async fn process(&mut self, header: &BlockHeader, stop: &mut StopListener) -> Outcome {
        let fetched = tokio::select! {
            () = stop.stopped() => {
                info!(observer = %self.config.name, block = header.number, "Stop requested during log fetch");
                return Outcome::Abandoned;
            }
            fetched = self.fetch(header) => fetched,
        };

        let logs = match fetched {
            Ok(logs) => logs,
            Err(e) => {
                error!(
                    observer = %self.config.name,
                    block = header.number,
                    hash = %header.hash,
                    error = %e,
                    "Failed to fetch block logs, skipping block"
                );
                return Outcome::Skipped;
            }
        };

        let mut seen: HashSet<(B256, u64)> = HashSet::with_capacity(logs.len());
        let mut emitted = 0;
        for log in logs {
            if !seen.insert((log.block_hash, log.log_index)) {
                debug!(block = header.number, log_index = log.log_index, "Duplicate log in fetch result");
                continue;
            }
            if !self.filter.is_of_interest(&log) {
                continue;
            }

            let pushed = tokio::select! {
                () = stop.stopped() => {
                    warn!(
                        observer = %self.config.name,
                        block = header.number,
                        emitted,
                        "Stop requested while event queue full, abandoning block"
                    );
                    return Outcome::Abandoned;
                }
                pushed = self.events.push(Arc::new(log)) => pushed,
            };

            if let Err(e) = pushed {
                error!(observer = %self.config.name, block = header.number, error = %e, "Event queue closed");
                return Outcome::Disconnected;
            }
            emitted += 1;
        }

        debug!(observer = %self.config.name, block = header.number, emitted, "Block processed");
        self.advance(header);
        Outcome::Processed { emitted }
    }

    async fn fetch(&self, header: &BlockHeader) -> ObserverResult<Vec<EventLog>> {
        let call = self.source.block_logs(header.hash, self.config.topics.topics());
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ObserverError::rpc(format!("log fetch timed out after {}ms", limit.as_millis()), None)
            })?,
            None => call.await,
        }
    }

    /// Make `header` the checkpoint candidate unless that would move it back.
    fn advance(&mut self, header: &BlockHeader) {
        if let Some(current) = &self.checkpoint {
            if header.number < current.number {
                debug!(
                    observer = %self.config.name,
                    block = header.number,
                    checkpoint = current.number,
                    "Keeping newer checkpoint"
                );
                return;
            }
        }
        self.checkpoint = Some(header.clone());
        self.pending = true;
    }

    /// Send the checkpoint if it moved since the last successful notification.
    async fn notify(&mut self) {
        if !self.pending {
            return;
        }
        let Some(header) = self.checkpoint.clone() else {
            return;
        };

        match self.source.notify_checkpoint(&self.config.name, &header).await {
            Ok(()) => {
                self.pending = false;
                debug!(observer = %self.config.name, block = header.number, "Checkpoint notified");
            }
            Err(e) => {
                warn!(
                    observer = %self.config.name,
                    block = header.number,
                    error = %e,
                    "Checkpoint notification failed, retrying next tick"
                );
            }
        }
    }
}

//! Bounded, ordered hand-off of matched events to downstream consumers.
//!
//! One observer produces; any number of consumers compete for the same FIFO.
//! A full queue blocks the producer, which is how slow consumers back-pressure
//! the pipeline.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::{ObserverError, ObserverResult};
use crate::types::EventLog;

/// Default number of events the queue holds before producing blocks.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1000;

/// Constructor for the producer/consumer pair.
pub struct EventQueue;

impl EventQueue {
    /// Create a queue holding at most `capacity` events.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::QueueError`] if `capacity` is zero.
    pub fn bounded(capacity: usize) -> ObserverResult<(EventSender, EventReceiver)> {
        if capacity == 0 {
            return Err(ObserverError::queue("event queue capacity must be positive"));
        }

        let (tx, rx) = mpsc::channel(capacity);
        Ok((
            EventSender { tx },
            EventReceiver {
                rx: Arc::new(Mutex::new(rx)),
                capacity,
            },
        ))
    }
}

/// Producing side, owned by exactly one observer.
#[derive(Debug)]
pub struct EventSender {
    tx: mpsc::Sender<Arc<EventLog>>,
}

impl EventSender {
    /// Push an event, waiting while the queue is full.
    ///
    /// Cancelling the returned future leaves the event unqueued.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::QueueError`] if every consumer is gone.
    pub async fn push(&self, event: Arc<EventLog>) -> ObserverResult<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| ObserverError::queue("all event consumers are gone"))
    }

    /// Number of events queued and not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Fixed capacity of the queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consuming side; clones share one FIFO.
#[derive(Debug, Clone)]
pub struct EventReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Arc<EventLog>>>>,
    capacity: usize,
}

impl EventReceiver {
    /// Next event in push order, waiting while the queue is empty.
    ///
    /// Returns `None` once the producer is gone and the queue is drained.
    pub async fn recv(&self) -> Option<Arc<EventLog>> {
        self.rx.lock().await.recv().await
    }

    /// Next event if one is ready right now.
    #[must_use]
    pub fn try_recv(&self) -> Option<Arc<EventLog>> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Fixed capacity of the queue.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, B256};
    use std::time::Duration;

    fn event(index: u64) -> Arc<EventLog> {
        Arc::new(EventLog {
            block_hash: B256::ZERO,
            block_number: 1,
            address: Address::ZERO,
            topics: Vec::new(),
            data: Bytes::new(),
            log_index: index,
            transaction_hash: None,
        })
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(EventQueue::bounded(0).is_err());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, rx) = EventQueue::bounded(4).expect("valid capacity");
        for i in 0..3 {
            tx.push(event(i)).await.expect("consumer alive");
        }
        assert_eq!(tx.pending(), 3);

        for i in 0..3 {
            assert_eq!(rx.recv().await.map(|e| e.log_index), Some(i));
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_until_consumed() {
        let (tx, rx) = EventQueue::bounded(2).expect("valid capacity");
        tx.push(event(0)).await.expect("consumer alive");
        tx.push(event(1)).await.expect("consumer alive");

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.push(event(2))).await;
        assert!(blocked.is_err(), "push into a full queue must block");

        assert_eq!(rx.recv().await.map(|e| e.log_index), Some(0));
        tokio::time::timeout(Duration::from_millis(50), tx.push(event(3)))
            .await
            .expect("push must unblock once space frees")
            .expect("consumer alive");
    }

    #[tokio::test]
    async fn test_recv_ends_after_producer_dropped() {
        let (tx, rx) = EventQueue::bounded(2).expect("valid capacity");
        tx.push(event(7)).await.expect("consumer alive");
        drop(tx);

        assert_eq!(rx.recv().await.map(|e| e.log_index), Some(7));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_push_fails_without_consumers() {
        let (tx, rx) = EventQueue::bounded(1).expect("valid capacity");
        drop(rx);
        assert!(tx.push(event(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_cloned_receivers_share_queue() {
        let (tx, rx) = EventQueue::bounded(4).expect("valid capacity");
        let other = rx.clone();
        tx.push(event(0)).await.expect("consumer alive");
        tx.push(event(1)).await.expect("consumer alive");

        assert_eq!(other.recv().await.map(|e| e.log_index), Some(0));
        assert_eq!(rx.recv().await.map(|e| e.log_index), Some(1));
        assert_eq!(rx.capacity(), 4);
    }
}

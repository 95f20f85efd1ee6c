//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use eth_log_observer::chain::{ChainSource, HeaderStream};
use eth_log_observer::error::{ObserverError, ObserverResult};
use eth_log_observer::types::{BlockHeader, EventLog, TopicFilter};
use futures_util::stream;
use tokio::sync::mpsc;

/// In-memory chain: scripted logs per block, injectable failures, recorded
/// checkpoint notifications and a header feed driven by the test.
pub struct MockChainSource {
    logs: Mutex<HashMap<B256, Vec<EventLog>>>,
    failing: Mutex<HashSet<B256>>,
    slow: Mutex<HashMap<B256, Duration>>,
    notifications: Mutex<Vec<(String, BlockHeader)>>,
    notify_attempts: AtomicUsize,
    fail_notify: AtomicBool,
    header_tx: mpsc::UnboundedSender<BlockHeader>,
    header_rx: Mutex<Option<mpsc::UnboundedReceiver<BlockHeader>>>,
}

impl MockChainSource {
    pub fn new() -> Arc<Self> {
        let (header_tx, header_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            logs: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            slow: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
            notify_attempts: AtomicUsize::new(0),
            fail_notify: AtomicBool::new(false),
            header_tx,
            header_rx: Mutex::new(Some(header_rx)),
        })
    }

    /// Script the logs returned for `header`.
    pub fn set_logs(&self, header: &BlockHeader, logs: Vec<EventLog>) {
        self.logs.lock().unwrap().insert(header.hash, logs);
    }

    /// Make log retrieval for `header` fail.
    pub fn fail_block(&self, header: &BlockHeader) {
        self.failing.lock().unwrap().insert(header.hash);
    }

    /// Make log retrieval for `header` take `delay`.
    pub fn slow_block(&self, header: &BlockHeader, delay: Duration) {
        self.slow.lock().unwrap().insert(header.hash, delay);
    }

    /// Make checkpoint notifications fail until reset.
    pub fn set_fail_notify(&self, fail: bool) {
        self.fail_notify.store(fail, Ordering::SeqCst);
    }

    /// Emit a header on the upstream subscription.
    pub fn push_header(&self, header: BlockHeader) {
        self.header_tx.send(header).unwrap();
    }

    /// Successful checkpoint notifications, in order.
    pub fn notifications(&self) -> Vec<(String, BlockHeader)> {
        self.notifications.lock().unwrap().clone()
    }

    /// Block numbers of successful notifications for `observer`.
    pub fn checkpoints_of(&self, observer: &str) -> Vec<u64> {
        self.notifications()
            .into_iter()
            .filter(|(name, _)| name == observer)
            .map(|(_, header)| header.number)
            .collect()
    }

    /// Notification attempts, including failed ones.
    pub fn notify_attempts(&self) -> usize {
        self.notify_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainSource for MockChainSource {
    async fn block_logs(&self, block_hash: B256, topics: &[B256]) -> ObserverResult<Vec<EventLog>> {
        let delay = self.slow.lock().unwrap().get(&block_hash).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&block_hash) {
            return Err(ObserverError::rpc(format!("scripted failure for {block_hash}"), None));
        }

        let filter = TopicFilter::new(topics.iter().copied());
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(&block_hash)
            .map(|logs| logs.iter().filter(|log| filter.admits(log)).cloned().collect())
            .unwrap_or_default())
    }

    async fn notify_checkpoint(&self, observer: &str, header: &BlockHeader) -> ObserverResult<()> {
        self.notify_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(ObserverError::database("scripted notification failure", None));
        }
        self.notifications
            .lock()
            .unwrap()
            .push((observer.to_string(), header.clone()));
        Ok(())
    }

    async fn subscribe_headers(&self) -> ObserverResult<HeaderStream> {
        match self.header_rx.lock().unwrap().take() {
            Some(rx) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|header| (header, rx))
            }))),
            // Later subscriptions never yield
            None => Ok(Box::pin(stream::pending())),
        }
    }
}

/// Block `number` of a linear test chain.
pub fn header(number: u64) -> BlockHeader {
    BlockHeader::new(number, block_hash(number), block_hash(number.saturating_sub(1)), 1_700_000_000 + number * 12)
}

pub fn block_hash(number: u64) -> B256 {
    B256::left_padding_from(&number.to_be_bytes())
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn topic(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

/// Log emitted by `address` with signature `topic` at `log_index` of `block`.
pub fn log(block: &BlockHeader, address: Address, topic: B256, log_index: u64) -> EventLog {
    EventLog {
        block_hash: block.hash,
        block_number: block.number,
        address,
        topics: vec![topic],
        data: Bytes::from(vec![log_index as u8]),
        log_index,
        transaction_hash: Some(B256::repeat_byte(0xee)),
    }
}

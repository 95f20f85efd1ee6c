//! Integration tests for the observer pipeline.
//!
//! # Test Strategy
//!
//! The chain is replaced by [`common::MockChainSource`], which serves scripted
//! logs per block hash and records every checkpoint notification. Headers are
//! either fed straight into an observer's input channel or routed through a
//! [`BlockRouter`] subscribed to the mock.
//!
//! Tick-driven behavior runs on a paused clock: sleeping in the test lets the
//! runtime jump to the observer's next checkpoint tick once every task is idle.
//! Shutdown tests run on the real clock with generous bounds.

mod common;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use common::{addr, header, log, topic, MockChainSource};
use eth_log_observer::chain::ChainSource;
use eth_log_observer::error::ObserverError;
use eth_log_observer::svc::{
    BlockObserver, BlockRouter, EventReceiver, ObserverConfig, ServiceHandle, ServiceManager, ServiceState,
    WatchList,
};
use eth_log_observer::types::{BlockHeader, TopicFilter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(5);
const BOUND: Duration = Duration::from_secs(5);

struct Running {
    handle: ServiceHandle,
    task: JoinHandle<()>,
    events: EventReceiver,
    input: mpsc::Sender<BlockHeader>,
}

fn spawn_observer(
    mock: &Arc<MockChainSource>,
    manager: &Arc<ServiceManager>,
    config: ObserverConfig,
    contracts: &[Address],
) -> Running {
    let source: Arc<dyn ChainSource> = mock.clone();
    let filter = Arc::new(WatchList::new(contracts.iter().copied()));
    let (observer, events) = BlockObserver::new(config, source, filter).expect("valid observer");

    let (input, rx) = mpsc::channel(16);
    let (handle, task) = observer.start_with_input(rx, Arc::clone(manager)).expect("registered");
    Running {
        handle,
        task,
        events,
        input,
    }
}

fn drain(events: &EventReceiver) -> Vec<(u64, Address, u64)> {
    std::iter::from_fn(|| events.try_recv())
        .map(|e| (e.block_number, e.address, e.log_index))
        .collect()
}

/// Two blocks, one watched contract, one watched topic: exactly the matching
/// events come out in order and the second block becomes the checkpoint.
#[tokio::test(start_paused = true)]
async fn test_forwards_matching_events_and_checkpoints() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let (h1, h2) = (header(1), header(2));
    let (a, b) = (addr(0xaa), addr(0xbb));
    let (t1, t2) = (topic(0x01), topic(0x02));

    mock.set_logs(&h1, vec![log(&h1, a, t1, 0), log(&h1, b, t2, 1)]);
    mock.set_logs(&h2, vec![log(&h2, a, t1, 0)]);

    let config = ObserverConfig::new("obs")
        .with_topics(TopicFilter::new([t1]))
        .with_queue_capacity(2)
        .with_checkpoint_interval(TICK);
    let obs = spawn_observer(&mock, &manager, config, &[a]);
    assert_eq!(obs.handle.state(), ServiceState::Running);

    obs.input.send(h1.clone()).await.expect("observer alive");
    obs.input.send(h2.clone()).await.expect("observer alive");
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    assert_eq!(drain(&obs.events), vec![(1, a, 0), (2, a, 0)]);
    assert_eq!(mock.checkpoints_of("obs"), vec![2]);
    assert_eq!(mock.notifications()[0].1, h2);

    manager.shutdown().await;
    assert_eq!(obs.handle.state(), ServiceState::Closed);
}

/// A failed log fetch skips the block: nothing emitted, checkpoint stays on
/// the last processed block, and later blocks are still handled.
#[tokio::test(start_paused = true)]
async fn test_fetch_failure_skips_block() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let a = addr(0xaa);
    let blocks: Vec<_> = (1..=4).map(header).collect();
    for block in &blocks {
        mock.set_logs(block, vec![log(block, a, topic(1), 0)]);
    }
    mock.fail_block(&blocks[2]);

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[a]);
    for block in &blocks[..3] {
        obs.input.send(block.clone()).await.expect("observer alive");
    }
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    assert_eq!(drain(&obs.events), vec![(1, a, 0), (2, a, 0)]);
    assert_eq!(mock.checkpoints_of("obs"), vec![2]);

    obs.input.send(blocks[3].clone()).await.expect("observer alive");
    tokio::time::sleep(TICK).await;

    assert_eq!(drain(&obs.events), vec![(4, a, 0)]);
    assert_eq!(mock.checkpoints_of("obs"), vec![2, 4]);
    assert_eq!(obs.handle.state(), ServiceState::Running);
}

/// Ticks without progress send nothing.
#[tokio::test(start_paused = true)]
async fn test_checkpoint_sent_only_when_moved() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[]);

    tokio::time::sleep(TICK * 2).await;
    assert_eq!(mock.notify_attempts(), 0, "no block processed yet");

    obs.input.send(header(1)).await.expect("observer alive");
    tokio::time::sleep(TICK * 4).await;
    assert_eq!(mock.notify_attempts(), 1);

    // Wake after the tick, not on it
    obs.input.send(header(2)).await.expect("observer alive");
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(mock.checkpoints_of("obs"), vec![1, 2]);
    assert_eq!(mock.notify_attempts(), 2);
}

/// A header older than the checkpoint is processed but never moves it back.
#[tokio::test(start_paused = true)]
async fn test_checkpoint_never_moves_backwards() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let a = addr(0xaa);
    let (h3, h5) = (header(3), header(5));
    mock.set_logs(&h3, vec![log(&h3, a, topic(1), 0)]);

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[a]);
    obs.input.send(h5).await.expect("observer alive");
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(mock.checkpoints_of("obs"), vec![5]);

    obs.input.send(h3).await.expect("observer alive");
    tokio::time::sleep(TICK * 3).await;

    assert_eq!(drain(&obs.events), vec![(3, a, 0)]);
    assert_eq!(mock.checkpoints_of("obs"), vec![5]);

    manager.shutdown().await;
    assert_eq!(mock.checkpoints_of("obs"), vec![5], "final flush must not regress either");
}

/// A failed notification stays pending and is retried on the next tick.
#[tokio::test(start_paused = true)]
async fn test_failed_notification_retried() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    mock.set_fail_notify(true);

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[]);
    obs.input.send(header(7)).await.expect("observer alive");
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;
    assert_eq!(mock.notify_attempts(), 1);
    assert!(mock.notifications().is_empty());

    mock.set_fail_notify(false);
    tokio::time::sleep(TICK).await;
    assert_eq!(mock.notify_attempts(), 2);
    assert_eq!(mock.checkpoints_of("obs"), vec![7]);
}

/// Stopping before the first tick still delivers the latest checkpoint.
#[tokio::test(start_paused = true)]
async fn test_checkpoint_flushed_on_stop() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[]);

    obs.input.send(header(1)).await.expect("observer alive");
    obs.input.send(header(2)).await.expect("observer alive");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(mock.notifications().is_empty());

    manager.shutdown().await;
    obs.task.await.expect("observer task");

    assert_eq!(mock.checkpoints_of("obs"), vec![2]);
    assert_eq!(obs.handle.state(), ServiceState::Closed);
}

/// With the queue full and nobody consuming, shutdown still completes in
/// bounded time. The rest of the stalled block is dropped and the block is
/// not checkpointed.
#[tokio::test]
async fn test_shutdown_with_full_queue() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let a = addr(0xaa);
    let h1 = header(1);
    mock.set_logs(&h1, (0..3).map(|i| log(&h1, a, topic(1), i)).collect());

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs").with_queue_capacity(1), &[a]);
    obs.input.send(h1).await.expect("observer alive");
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.shutdown_with_timeout(BOUND).await.expect("closed in time");
    assert_eq!(obs.handle.state(), ServiceState::Closed);
    assert!(manager.is_empty());
    obs.task.await.expect("observer task");

    assert_eq!(obs.events.try_recv().map(|e| e.log_index), Some(0));
    assert!(obs.events.recv().await.is_none(), "no events after the stop");
    assert!(mock.notifications().is_empty(), "abandoned block must not be checkpointed");
}

/// A stop request interrupts a log fetch that would otherwise hang.
#[tokio::test]
async fn test_shutdown_during_slow_fetch() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let h1 = header(1);
    mock.slow_block(&h1, Duration::from_secs(3600));

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[]);
    obs.input.send(h1).await.expect("observer alive");
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.shutdown_with_timeout(BOUND).await.expect("closed in time");
    assert_eq!(obs.handle.state(), ServiceState::Closed);
    assert!(mock.notifications().is_empty());
}

/// A fetch exceeding the configured timeout is treated as a failure.
#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_skips_block() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let a = addr(0xaa);
    let (h1, h2) = (header(1), header(2));
    mock.set_logs(&h1, vec![log(&h1, a, topic(1), 0)]);
    mock.set_logs(&h2, vec![log(&h2, a, topic(1), 0)]);
    mock.slow_block(&h1, Duration::from_secs(60));

    let config = ObserverConfig::new("obs").with_fetch_timeout(Some(Duration::from_secs(1)));
    let obs = spawn_observer(&mock, &manager, config, &[a]);
    obs.input.send(h1).await.expect("observer alive");
    obs.input.send(h2).await.expect("observer alive");
    tokio::time::sleep(TICK + Duration::from_secs(1)).await;

    assert_eq!(drain(&obs.events), vec![(2, a, 0)]);
    assert_eq!(mock.checkpoints_of("obs"), vec![2]);
}

/// Logs keep their order within and across blocks; repeats are dropped.
#[tokio::test(start_paused = true)]
async fn test_event_order_and_dedup() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let (a, c) = (addr(0xaa), addr(0xcc));
    let (h1, h2) = (header(1), header(2));
    mock.set_logs(
        &h1,
        vec![
            log(&h1, a, topic(1), 0),
            log(&h1, c, topic(1), 1),
            log(&h1, a, topic(2), 2),
            log(&h1, a, topic(2), 2),
            log(&h1, a, topic(3), 3),
        ],
    );
    mock.set_logs(&h2, vec![log(&h2, a, topic(1), 0), log(&h2, a, topic(1), 1)]);

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[a]);
    obs.input.send(h1).await.expect("observer alive");
    obs.input.send(h2).await.expect("observer alive");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        drain(&obs.events),
        vec![(1, a, 0), (1, a, 2), (1, a, 3), (2, a, 0), (2, a, 1)]
    );
}

/// Observer names are unique across the manager.
#[tokio::test]
async fn test_duplicate_observer_name_rejected() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let _first = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[]);

    let source: Arc<dyn ChainSource> = mock.clone();
    let (second, _events) =
        BlockObserver::new(ObserverConfig::new("obs"), source, Arc::new(WatchList::default())).expect("valid");
    let (_tx, rx) = mpsc::channel(1);

    let result = second.start_with_input(rx, Arc::clone(&manager));
    assert!(matches!(result, Err(ObserverError::ServiceError { .. })));
    assert_eq!(manager.services(), vec!["obs".to_string()]);
}

/// When the header input ends the observer stops and reports closure.
#[tokio::test]
async fn test_closed_input_stops_observer() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[]);

    obs.input.send(header(1)).await.expect("observer alive");
    drop(obs.input);

    tokio::time::timeout(BOUND, obs.handle.wait_closed()).await.expect("closed in time");
    assert!(manager.is_empty());
    assert_eq!(mock.checkpoints_of("obs"), vec![1]);
}

/// With every event consumer gone the observer has nowhere to deliver and stops.
#[tokio::test]
async fn test_dropped_consumer_stops_observer() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let a = addr(0xaa);
    let h1 = header(1);
    mock.set_logs(&h1, vec![log(&h1, a, topic(1), 0)]);

    let obs = spawn_observer(&mock, &manager, ObserverConfig::new("obs"), &[a]);
    drop(obs.events);
    obs.input.send(h1).await.expect("observer alive");

    tokio::time::timeout(BOUND, obs.handle.wait_closed()).await.expect("closed in time");
    assert!(mock.notifications().is_empty());
}

/// One upstream subscription feeds every observer; each applies its own filter.
#[tokio::test]
async fn test_router_fans_out_to_observers() {
    let mock = MockChainSource::new();
    let manager = Arc::new(ServiceManager::new());
    let (a, b) = (addr(0xaa), addr(0xbb));
    let (h1, h2) = (header(1), header(2));
    mock.set_logs(&h1, vec![log(&h1, a, topic(1), 0), log(&h1, b, topic(1), 1)]);
    mock.set_logs(&h2, vec![log(&h2, b, topic(1), 0)]);

    let source: Arc<dyn ChainSource> = mock.clone();
    let mut router = BlockRouter::new(4).expect("valid buffer");

    let (alpha, alpha_events) = BlockObserver::new(
        ObserverConfig::new("alpha"),
        Arc::clone(&source),
        Arc::new(WatchList::new([a])),
    )
    .expect("valid");
    let (beta, beta_events) =
        BlockObserver::new(ObserverConfig::new("beta"), Arc::clone(&source), Arc::new(WatchList::new([b])))
            .expect("valid");

    alpha.start(&mut router, Arc::clone(&manager)).expect("registered");
    beta.start(&mut router, Arc::clone(&manager)).expect("registered");
    assert_eq!(router.subscriber_count(), 2);
    let (router_handle, _router_task) = router.start(source, Arc::clone(&manager)).expect("registered");

    mock.push_header(h1);
    mock.push_header(h2);

    let recv = |events: &EventReceiver| {
        let events = events.clone();
        async move {
            tokio::time::timeout(BOUND, events.recv())
                .await
                .expect("event in time")
                .map(|e| (e.block_number, e.address, e.log_index))
        }
    };
    assert_eq!(recv(&alpha_events).await, Some((1, a, 0)));
    assert_eq!(recv(&beta_events).await, Some((1, b, 1)));
    assert_eq!(recv(&beta_events).await, Some((2, b, 0)));

    assert_eq!(manager.len(), 3);
    manager.shutdown_with_timeout(BOUND).await.expect("closed in time");
    assert_eq!(router_handle.state(), ServiceState::Closed);
    assert!(alpha_events.try_recv().is_none());
    // alpha may be stopped before it sees the second header
    assert!(matches!(mock.checkpoints_of("alpha").last(), Some(1 | 2)));
    assert_eq!(mock.checkpoints_of("beta"), vec![2]);
}

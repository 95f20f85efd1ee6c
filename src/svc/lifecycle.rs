//! Stop signalling and lifecycle tracking shared by all services.
//!
//! The stop signal is level-triggered: once raised it stays raised, so every
//! waiter observes it no matter when it starts waiting, and raising it never
//! blocks the caller, however often it is raised.

use std::fmt;
use std::sync::{Arc, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use super::manager::{Service, ServiceManager};

/// Lifecycle state of a running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Constructed, not yet wired or registered
    Created,
    /// Registered with the manager and processing input
    Running,
    /// Run loop left, cleanup in progress
    Stopping,
    /// Closure reported to the manager
    Closed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Raising side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Create a signal in the lowered state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent and never blocks.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been raised.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// New waiter for this signal.
    #[must_use]
    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waiting side of a stop signal.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Resolve once the signal is raised; immediately if it already was.
    ///
    /// Cancel safe, so it can sit in a `select!` next to other branches.
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Every signal owner is gone; nobody is left to lower it.
                return;
            }
        }
    }

    /// Whether the signal has been raised.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Cloneable handle to a running service, as registered with the manager.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    name: Arc<str>,
    stop: StopSignal,
    state: watch::Receiver<ServiceState>,
}

impl ServiceHandle {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// Wait until the service reports closure.
    pub async fn wait_closed(&self) {
        let mut state = self.state.clone();
        while *state.borrow_and_update() != ServiceState::Closed {
            if state.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Service for ServiceHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) {
        debug!(service = %self.name, "Stop requested");
        self.stop.stop();
    }
}

/// Owner side of a service's stop signal and state.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    name: Arc<str>,
    stop: StopSignal,
    state: Arc<watch::Sender<ServiceState>>,
}

impl Lifecycle {
    pub(crate) fn new(name: &str) -> Self {
        let (state, _rx) = watch::channel(ServiceState::Created);
        Self {
            name: Arc::from(name),
            stop: StopSignal::new(),
            state: Arc::new(state),
        }
    }

    pub(crate) fn set(&self, state: ServiceState) {
        self.state.send_replace(state);
    }

    pub(crate) fn listener(&self) -> StopListener {
        self.stop.listener()
    }

    pub(crate) fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            name: Arc::clone(&self.name),
            stop: self.stop.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Guard that reports closure when dropped, including on panic.
    pub(crate) fn close_guard(&self, manager: Arc<ServiceManager>) -> CloseGuard {
        CloseGuard {
            name: Arc::clone(&self.name),
            state: Arc::clone(&self.state),
            manager,
        }
    }
}

/// Marks the service closed and deregisters it exactly once, on drop.
pub(crate) struct CloseGuard {
    name: Arc<str>,
    state: Arc<watch::Sender<ServiceState>>,
    manager: Arc<ServiceManager>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.state.send_replace(ServiceState::Closed);
        self.manager.closed(&self.name);
    }
}

/// Recover the data of a poisoned lock; the registry stays usable after a
/// panicking service.
pub(crate) fn unpoison<T>(err: PoisonError<T>) -> T {
    err.into_inner()
}

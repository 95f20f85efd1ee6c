//! Service registry and coordinated shutdown.
//!
//! The manager owns handles to every running service. Services register once
//! they are running and deregister themselves once fully stopped; shutdown
//! signals each of them and then waits for the registry to drain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::lifecycle::unpoison;
use crate::error::{ObserverError, ObserverResult};

/// A long-running unit of work the manager can stop.
pub trait Service: Send + Sync {
    /// Unique name identifying the service in the registry.
    fn name(&self) -> &str;

    /// Request the service to stop. Must not block.
    fn close(&self);
}

/// Registry of running services.
pub struct ServiceManager {
    registry: Mutex<HashMap<String, Arc<dyn Service>>>,
    active: watch::Sender<usize>,
    shutting_down: AtomicBool,
}

impl ServiceManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        let (active, _rx) = watch::channel(0);
        Self {
            registry: Mutex::new(HashMap::new()),
            active,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Register a running service.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ServiceError`] if a service with the same name
    /// is already registered or shutdown has begun.
    pub fn add(&self, service: Arc<dyn Service>) -> ObserverResult<()> {
        // Checked under the lock so a registration either lands in the
        // shutdown snapshot or is refused.
        let mut registry = self.registry.lock().unwrap_or_else(unpoison);
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ObserverError::service(format!(
                "cannot register '{}' during shutdown",
                service.name()
            )));
        }

        let name = service.name().to_string();
        if registry.contains_key(&name) {
            return Err(ObserverError::service(format!(
                "service '{name}' already registered"
            )));
        }

        registry.insert(name.clone(), service);
        self.active.send_replace(registry.len());
        info!(service = %name, "Service registered");
        Ok(())
    }

    /// Deregister a service that has fully stopped.
    pub fn closed(&self, name: &str) {
        let mut registry = self.registry.lock().unwrap_or_else(unpoison);
        if registry.remove(name).is_none() {
            warn!(service = name, "Closure reported by unknown service");
            return;
        }

        self.active.send_replace(registry.len());
        info!(service = name, remaining = registry.len(), "Service closed");
    }

    /// Whether a service with this name is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(unpoison)
            .contains_key(name)
    }

    /// Names of all registered services, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .lock()
            .unwrap_or_else(unpoison)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        *self.active.borrow()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal every registered service to stop and wait until all of them
    /// have reported closure.
    ///
    /// Waits indefinitely; a service that never reports closure hangs the
    /// caller. See [`Self::shutdown_with_timeout`] for a bounded wait.
    pub async fn shutdown(&self) {
        self.signal_all();

        let mut active = self.active.subscribe();
        while *active.borrow_and_update() > 0 {
            if active.changed().await.is_err() {
                break;
            }
        }

        info!("All services closed");
    }

    /// Like [`Self::shutdown`], but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::ShutdownTimeout`] naming the services that
    /// did not report closure in time.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> ObserverResult<()> {
        if tokio::time::timeout(timeout, self.shutdown()).await.is_ok() {
            return Ok(());
        }

        let pending = self.services();
        error!(
            timeout_secs = timeout.as_secs(),
            pending = ?pending,
            "Shutdown timed out, services did not report closure"
        );
        Err(ObserverError::shutdown_timeout(pending))
    }

    fn signal_all(&self) {
        let services: Vec<Arc<dyn Service>> = {
            let registry = self.registry.lock().unwrap_or_else(unpoison);
            self.shutting_down.store(true, Ordering::SeqCst);
            registry.values().cloned().collect()
        };

        info!(count = services.len(), "Signalling services to stop");
        for service in services {
            debug!(service = service.name(), "Closing service");
            service.close();
        }
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

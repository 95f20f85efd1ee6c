//! Error types for the block observer pipeline.
//!
//! This module provides a unified error type [`ObserverError`] covering every
//! failure the crate can return to a caller: configuration, RPC and WebSocket
//! access, checkpoint persistence, service registration and shutdown.
//!
//! # Design
//!
//! The error hierarchy is organized by layer:
//! - [`ObserverError::ConfigError`]: Configuration and environment issues
//! - [`ObserverError::RpcError`]: Log retrieval and other RPC failures
//! - [`ObserverError::DatabaseError`]: Checkpoint storage failures
//! - [`ObserverError::WebSocketConnectionError`] / [`ObserverError::WebSocketSubscriptionError`]:
//!   Header feed failures
//! - [`ObserverError::ServiceError`]: Service registry misuse
//! - [`ObserverError::ShutdownTimeout`]: Services that never reported closure
//!
//! Failures inside the running pipeline (a block whose logs cannot be fetched,
//! a checkpoint that cannot be written) are logged and absorbed by the
//! services; they never travel back to the caller as values of this type.
//!
//! # Example
//!
//! ```
//! use eth_log_observer::error::{ObserverError, ObserverResult};
//!
//! fn validate_capacity(capacity: usize) -> ObserverResult<()> {
//!     if capacity == 0 {
//!         return Err(ObserverError::config("capacity cannot be zero", None));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`ObserverError`].
pub type ObserverResult<T> = Result<T, ObserverError>;

/// Boxed error source carried by most variants.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the block observer pipeline.
#[derive(Debug)]
pub enum ObserverError {
    /// Configuration or environment variable errors.
    ///
    /// Variants include:
    /// - Missing or invalid environment variables
    /// - Invalid addresses, topics or URLs
    /// - Zero capacities or intervals
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// RPC provider or network errors.
    ///
    /// Variants include:
    /// - Failed to fetch the logs of a block
    /// - Failed to fetch a block header during backfill
    /// - Fetch timed out
    RpcError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// Checkpoint storage errors.
    DatabaseError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// WebSocket connection errors.
    WebSocketConnectionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// WebSocket subscription errors.
    WebSocketSubscriptionError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: Option<BoxedSource>,
    },

    /// WebSocket disconnection error.
    ///
    /// Occurs when the header stream ends unexpectedly
    /// and a new subscription is required.
    WebSocketDisconnected {
        /// Human-readable error message
        message: String,
    },

    /// Service registry misuse, e.g. registering the same name twice.
    ServiceError {
        /// Human-readable error message
        message: String,
    },

    /// Event queue misuse, e.g. a zero capacity.
    QueueError {
        /// Human-readable error message
        message: String,
    },

    /// Shutdown gave up waiting for services to report closure.
    ShutdownTimeout {
        /// Names of the services still registered when the wait ended
        pending: Vec<String>,
    },
}

impl ObserverError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_log_observer::error::ObserverError;
    ///
    /// let err = ObserverError::config("WATCH_CONTRACTS not set", None);
    /// assert!(matches!(err, ObserverError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new RPC error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_log_observer::error::ObserverError;
    ///
    /// let err = ObserverError::rpc("Failed to fetch block logs", None);
    /// assert!(matches!(err, ObserverError::RpcError { .. }));
    /// ```
    #[must_use]
    pub fn rpc(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::RpcError {
            message: message.into(),
            source,
        }
    }

    /// Create a new database error.
    #[must_use]
    pub fn database(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket connection error.
    #[must_use]
    pub fn websocket_connection(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::WebSocketConnectionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket subscription error.
    #[must_use]
    pub fn websocket_subscription(message: impl Into<String>, source: Option<BoxedSource>) -> Self {
        Self::WebSocketSubscriptionError {
            message: message.into(),
            source,
        }
    }

    /// Create a new WebSocket disconnection error.
    #[must_use]
    pub fn websocket_disconnected(message: impl Into<String>) -> Self {
        Self::WebSocketDisconnected {
            message: message.into(),
        }
    }

    /// Create a new service registry error.
    ///
    /// # Example
    ///
    /// ```
    /// use eth_log_observer::error::ObserverError;
    ///
    /// let err = ObserverError::service("service 'router' already registered");
    /// assert_eq!(err.to_string(), "Service error: service 'router' already registered");
    /// ```
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::ServiceError {
            message: message.into(),
        }
    }

    /// Create a new event queue error.
    #[must_use]
    pub fn queue(message: impl Into<String>) -> Self {
        Self::QueueError {
            message: message.into(),
        }
    }

    /// Create a shutdown timeout error listing the services still running.
    #[must_use]
    pub fn shutdown_timeout(pending: Vec<String>) -> Self {
        Self::ShutdownTimeout { pending }
    }
}

impl fmt::Display for ObserverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::RpcError { message, .. } => write!(f, "RPC error: {message}"),
            Self::DatabaseError { message, .. } => write!(f, "Database error: {message}"),
            Self::WebSocketConnectionError { message, .. } => {
                write!(f, "WebSocket connection error: {message}")
            }
            Self::WebSocketSubscriptionError { message, .. } => {
                write!(f, "WebSocket subscription error: {message}")
            }
            Self::WebSocketDisconnected { message } => {
                write!(f, "WebSocket disconnected: {message}")
            }
            Self::ServiceError { message } => write!(f, "Service error: {message}"),
            Self::QueueError { message } => write!(f, "Event queue error: {message}"),
            Self::ShutdownTimeout { pending } => {
                write!(
                    f,
                    "Shutdown timed out waiting for {} service(s): {}",
                    pending.len(),
                    pending.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ObserverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::RpcError { source, .. }
            | Self::DatabaseError { source, .. }
            | Self::WebSocketConnectionError { source, .. }
            | Self::WebSocketSubscriptionError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::WebSocketDisconnected { .. }
            | Self::ServiceError { .. }
            | Self::QueueError { .. }
            | Self::ShutdownTimeout { .. } => None,
        }
    }
}

/// Convert from `eyre::Report` to `ObserverError`.
///
/// The provider edge reports failures as `eyre` reports; they are
/// categorized as RPC errors by default.
impl From<eyre::Report> for ObserverError {
    fn from(err: eyre::Report) -> Self {
        Self::RpcError {
            message: err.to_string(),
            source: None,
        }
    }
}

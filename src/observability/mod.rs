//! Observability and structured logging infrastructure.
//!
//! # Features
//!
//! - **Structured Logging**: key-value fields (`block`, `hash`, `observer`, `error`)
//! - **Span Tracking**: `#[instrument]` spans on provider-facing calls
//! - **Multiple Formats**: console (pretty or JSON) and rotating JSON file output
//! - **Environment Filtering**: `RUST_LOG` variable support
//!
//! # Environment Configuration
//!
//! ```bash
//! # Component-specific levels
//! RUST_LOG=eth_log_observer=debug,sqlx=warn eth-log-observer run
//!
//! # JSON console output for log aggregation
//! LOG_JSON=true eth-log-observer run
//!
//! # Also write logs to a daily rotated file
//! LOG_FILE=./logs/observer.log eth-log-observer run
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter: info for this crate, warn for dependencies.
pub const DEFAULT_FILTER: &str = "eth_log_observer=info,warn";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`; without either,
/// [`DEFAULT_FILTER`] applies. With `log_file`, logs are additionally written
/// as JSON to a daily rotated file in the file's directory.
///
/// Keep the returned guard alive for the whole process: dropping it stops
/// the background file writer.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .or(log_level)
        .map_or_else(|| EnvFilter::new(DEFAULT_FILTER), EnvFilter::new);

    let console_layer = if json_output {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .boxed()
    };

    let (file_layer, guard) = match &log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::daily(
                directory,
                path.file_name().unwrap_or_else(|| OsStr::new("observer.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(json_output, file_logging = log_file.is_some(), "Tracing initialized");
    Ok(guard)
}

/// Route logs to the test harness; repeated calls are ignored.
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

//! CLI entry point for the block observer.
//!
//! ```text
//! main.rs (runtime + tracing)
//!     ↓
//! cli.rs (command dispatch)
//!     ↓
//! config → db → rpc (chain source) → svc (router, observer, manager)
//! ```

use eth_log_observer::{cli, observability};
use tracing::error;

/// Initializes tracing, then delegates to the CLI module.
///
/// Logging is controlled by `RUST_LOG`, `LOG_JSON` and `LOG_FILE`.
#[tokio::main]
async fn main() {
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    // Held until exit so buffered file logs are flushed.
    let _log_guard = match observability::init_tracing(None, log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run().await {
        error!(error = %e, "Application error");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

//! Command-line interface for the block observer.
//!
//! # Commands
//!
//! - `run`: start the pipeline and run until interrupted
//! - `checkpoints`: show stored observer checkpoints
//!
//! # Example
//!
//! ```bash
//! # Observe the configured contracts, printing forwarded events
//! eth-log-observer run --print-events
//!
//! # Where did each observer get to?
//! eth-log-observer checkpoints
//! ```

use std::future::Future;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::signal;
use tracing::{debug, error, info};

use crate::chain::ChainSource;
use crate::config::Config;
use crate::db::{create_pool, CheckpointRecord, CheckpointRepository};
use crate::error::{ObserverError, ObserverResult};
use crate::rpc::RpcChainSource;
use crate::svc::{BlockObserver, BlockRouter, EventReceiver, ServiceManager, WatchList};

const DEFAULT_DATABASE_URL: &str = "sqlite:./observer.db";

/// Ethereum block observer
#[derive(Parser, Debug)]
#[command(name = "eth-log-observer")]
#[command(about = "Routes new blocks to observers, forwards contract events and checkpoints progress", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline until interrupted (Ctrl-C or SIGTERM)
    Run {
        /// Print every forwarded event as a JSON line on stdout
        #[arg(short, long)]
        print_events: bool,
    },

    /// Show stored checkpoints
    Checkpoints {
        /// Database URL (default: DATABASE_URL or sqlite:./observer.db)
        #[arg(short, long)]
        database: Option<String>,
    },
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if configuration, connection setup or shutdown fails.
pub async fn run() -> ObserverResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { print_events } => run_pipeline(print_events).await,
        Commands::Checkpoints { database } => show_checkpoints(database).await,
    }
}

async fn run_pipeline(print_events: bool) -> ObserverResult<()> {
    let config = Config::from_env()?;
    info!(
        observer = config.observer_name(),
        contracts = config.watch_contracts().len(),
        topics = config.watch_topics().topics().len(),
        "Starting block observer pipeline"
    );

    let pool = create_pool(config.database_url()).await?;
    let source: Arc<dyn ChainSource> = Arc::new(
        RpcChainSource::connect(
            config.rpc_url(),
            config.ws_url(),
            pool,
            config.backfill_max_blocks(),
        )
        .await?,
    );

    let manager = Arc::new(ServiceManager::new());
    let mut router = BlockRouter::new(config.router_buffer())?;
    let filter = Arc::new(WatchList::new(config.watch_contracts().iter().copied()));
    let (observer, events) = BlockObserver::new(config.observer_config(), Arc::clone(&source), filter)?;

    let (_observer, observer_task) = observer.start(&mut router, Arc::clone(&manager))?;
    let (_router, router_task) = router.start(source, Arc::clone(&manager))?;
    let consumer = tokio::spawn(consume_events(events, print_events));

    let signal = shutdown_signal()?.await;
    info!(signal, "Shutdown signal received, stopping services");

    match config.shutdown_timeout() {
        Some(timeout) => manager.shutdown_with_timeout(timeout).await?,
        None => manager.shutdown().await,
    }

    for task in [observer_task, router_task] {
        if let Err(e) = task.await {
            error!(error = %e, "Service task failed");
        }
    }
    match consumer.await {
        Ok(count) => info!(events = count, "Event consumer drained"),
        Err(e) => error!(error = %e, "Event consumer failed"),
    }

    Ok(())
}

/// Resolves with the name of the first shutdown signal: Ctrl-C, or SIGTERM on Unix.
///
/// Handlers are installed before this returns, so a signal arriving before
/// the future is first polled is not lost.
fn shutdown_signal() -> ObserverResult<impl Future<Output = &'static str>> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| ObserverError::service(format!("Failed to install SIGTERM handler: {e}")))?;

    Ok(async move {
        let interrupt = async {
            match signal::ctrl_c().await {
                Ok(()) => "SIGINT",
                Err(e) => {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending().await
                }
            }
        };

        #[cfg(unix)]
        let terminated = async move {
            terminate.recv().await;
            "SIGTERM"
        };
        #[cfg(not(unix))]
        let terminated = std::future::pending::<&'static str>();

        tokio::select! {
            name = interrupt => name,
            name = terminated => name,
        }
    })
}

/// Drain the event queue until the observer is gone.
async fn consume_events(events: EventReceiver, print: bool) -> u64 {
    let mut count = 0;
    while let Some(event) = events.recv().await {
        count += 1;
        info!(
            block = event.block_number,
            hash = %event.block_hash,
            address = %event.address,
            log_index = event.log_index,
            "Event forwarded"
        );

        if print {
            match serde_json::to_string(&*event) {
                Ok(line) => println!("{line}"),
                Err(e) => error!(error = %e, "Failed to serialize event"),
            }
        }
    }
    debug!(count, "Event queue closed");
    count
}

async fn show_checkpoints(database: Option<String>) -> ObserverResult<()> {
    dotenvy::dotenv().ok();
    let database_url = database
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

    let repository = CheckpointRepository::new(create_pool(&database_url).await?);
    let records = repository.list_checkpoints().await?;

    if records.is_empty() {
        println!("{}", "No checkpoints stored yet".yellow());
        return Ok(());
    }

    println!(
        "{:<24} {:>12}  {:<66}  {}",
        "OBSERVER".bold(),
        "BLOCK".bold(),
        "HASH".bold(),
        "UPDATED".bold()
    );
    for record in &records {
        println!("{}", format_checkpoint(record));
    }
    Ok(())
}

fn format_checkpoint(record: &CheckpointRecord) -> String {
    let updated = chrono::DateTime::from_timestamp(record.updated_at, 0)
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());

    format!(
        "{:<24} {:>12}  {:<66}  {}",
        record.observer.cyan(),
        record.block_number.to_string().green(),
        record.block_hash.dimmed(),
        updated
    )
}

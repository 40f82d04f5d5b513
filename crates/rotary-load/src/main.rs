#![doc = include_str!("../README.md")]

mod config;
mod load;
mod telemetry;

use clap::Parser;
use config::{CliArgs, LoadConfig};
use load::Report;
use rotary::{RoundRobinExecutor, ShutdownPolicy};
use std::{sync::Arc, time::Instant};
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = Arc::new(LoadConfig::try_from(args)?);

    init_telemetry()?;
    log_startup_info(&config);

    let pool = Arc::new(RoundRobinExecutor::with_config(config.pool_config())?);
    let start = Instant::now();

    let (tally, interrupted) = tokio::select! {
        tally = load::run(Arc::clone(&pool), Arc::clone(&config)) => (Some(tally?), false),
        () = shutdown_signal() => (None, true),
    };

    // An interrupted run stops right away instead of draining.
    let policy = if interrupted {
        ShutdownPolicy::Abandon
    } else {
        config.shutdown_policy
    };
    let closer = Arc::clone(&pool);
    tokio::task::spawn_blocking(move || closer.shutdown_with(policy)).await??;

    let report = Report {
        elapsed_ms: start.elapsed().as_millis(),
        interrupted,
        tally,
        stats: pool.stats(),
    };

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.log();
    }
    Ok(())
}

fn log_startup_info(config: &LoadConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting load with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting load: {} tasks from {} submitters on {} workers",
            config.tasks,
            config.submitters,
            config.workers
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Stopping the load, abandoning queued work...");
}

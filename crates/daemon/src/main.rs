// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Convoy daemon (convoyd)
//!
//! Wires the engine to Postgres: runs the lease-guarded scheduler loop and
//! the orchestrator consumer pool against the shared store and bus, and
//! drains gracefully on SIGTERM/SIGINT.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod source;

use chrono::Duration as ChronoDuration;
use config::{Config, ConfigError};
use convoy_bus::PgBus;
use convoy_core::SystemClock;
use convoy_engine::{Orchestrator, Scheduler};
use convoy_storage::{PgLeaseLock, PgStore};
use source::PgSourceClient;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("convoyd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("convoyd {}", env!("CARGO_PKG_VERSION"));
                println!("Convoy daemon - migration-workflow scheduler and orchestrator");
                println!();
                println!("USAGE:");
                println!("    convoyd");
                println!();
                println!("Configuration is read from CONVOY_CONFIG (default ./convoy.toml);");
                println!("the database URL can be overridden via CONVOY_DATABASE_URL.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: convoyd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    // Missing required config refuses startup before anything else runs.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e @ (ConfigError::Missing(_) | ConfigError::NotFound(_))) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let _log_guard = setup_logging(&config)?;
    info!("starting convoyd");

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    PgStore::migrate(&pool).await?;

    let engine_config = Arc::new(config.engine_config());
    let store = Arc::new(PgStore::new(pool.clone()));
    let bus = Arc::new(PgBus::with_dedup_window(
        pool.clone(),
        ChronoDuration::minutes(config.bus.dedup_window_minutes),
    ));
    let lock = Arc::new(PgLeaseLock::new(pool.clone()));
    let sql_source = Arc::new(PgSourceClient::new(config.sources.clone()));
    let clock = SystemClock;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        clock.clone(),
        Arc::clone(&engine_config),
    ));
    orchestrator.setup().await?;
    let scheduler = Arc::new(Scheduler::new(
        store,
        bus,
        sql_source,
        lock,
        clock,
        Arc::clone(&engine_config),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let orchestrator_task = tokio::spawn(orchestrator.run(shutdown_rx.clone()));
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    info!(
        tick_secs = engine_config.tick_interval.as_secs(),
        concurrency = engine_config.handler_concurrency,
        "convoyd ready"
    );

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
    if shutdown_tx.send(true).is_err() {
        error!("shutdown channel closed early");
    }

    // The orchestrator drains in-flight handlers up to the grace period;
    // anything left is abandoned and the bus redelivers.
    let _ = scheduler_task.await;
    let _ = orchestrator_task.await;
    info!("convoyd stopped");
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| format!("invalid log path: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}

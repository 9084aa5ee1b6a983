//! # MediaWolf
//!
//! Runs the task scheduler and its HTTP/WebSocket gateway.
//!
//! Usage:
//!   mediawolf                        # Start scheduler + gateway (default port 5000)
//!   mediawolf --port 8080            # Custom port
//!   mediawolf tasks                  # Print persisted tasks and exit
//!   mediawolf run 3                  # Run task 3 once and exit

mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mediawolf_core::MediaWolfConfig;
use mediawolf_scheduler::{SchedulerEngine, SystemClock, TaskManager, TaskStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediawolf", version, about = "🐺 MediaWolf — media sync task scheduler")]
struct Cli {
    /// Config file (default: ~/.mediawolf/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Gateway port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and gateway (default)
    Serve,
    /// Print the persisted tasks and exit
    Tasks,
    /// Run one task now and exit
    Run {
        /// Task id
        id: u32,
    },
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

fn build_engine(config: &MediaWolfConfig) -> Arc<SchedulerEngine> {
    Arc::new(SchedulerEngine::new(
        Arc::new(SystemClock),
        Duration::from_millis(config.scheduler.tick_interval_ms),
        config.scheduler.max_concurrent_runs,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "mediawolf=debug,mediawolf_scheduler=debug,mediawolf_gateway=debug,tower_http=debug"
    } else {
        "mediawolf=info,mediawolf_scheduler=info,mediawolf_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => MediaWolfConfig::load_from(Path::new(&expand_path(path)))?,
        None => MediaWolfConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    let tasks_file = PathBuf::from(expand_path(&config.scheduler.tasks_file.to_string_lossy()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Tasks => {
            let store = TaskStore::new(&tasks_file);
            println!("{:>3}  {:<24} {:<14} {:<10} LAST RUN", "ID", "NAME", "CRON", "STATUS");
            for task in store.load() {
                println!(
                    "{:>3}  {:<24} {:<14} {:<10} {}",
                    task.id,
                    task.name,
                    task.cron,
                    task.status.to_string(),
                    task.last_run
                );
            }
        }
        Command::Run { id } => {
            let registry = services::build_registry(&config.services);
            let manager = TaskManager::start(TaskStore::new(&tasks_file), registry, build_engine(&config)).await;
            let outcome = manager.run(id).await?;
            let task = manager.get(id).await?;
            println!("Task {id} ({}): {outcome:?}, last run {}", task.name, task.last_run);
        }
        Command::Serve => serve(config, tasks_file).await?,
    }
    Ok(())
}

async fn serve(config: MediaWolfConfig, tasks_file: PathBuf) -> Result<()> {
    tracing::info!("🐺 MediaWolf v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Tasks file: {}", tasks_file.display());

    let registry = services::build_registry(&config.services);
    let engine = build_engine(&config);
    let manager = TaskManager::start(TaskStore::new(&tasks_file), registry, engine.clone()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock = engine.spawn(shutdown_rx.clone());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let mut gateway_shutdown = shutdown_rx;
    mediawolf_gateway::serve(&config.gateway, manager, async move {
        let _ = gateway_shutdown.wait_for(|stop| *stop).await;
    })
    .await?;

    clock.await?;
    tracing::info!("👋 MediaWolf stopped");
    Ok(())
}

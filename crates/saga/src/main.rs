//! Saga Server
//!
//! Loads packages, runs until interrupted, then shuts down in order.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use saga::{Orchestrator, SystemConfig};

/// Saga game runtime
#[derive(Parser, Debug)]
#[command(name = "saga")]
#[command(about = "Saga package-driven game runtime", long_about = None)]
struct Args {
    /// Path to the config file (defaults to ./saga.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Additional package directory to load (repeatable)
    #[arg(short, long = "package")]
    packages: Vec<PathBuf>,

    /// Load packages but don't start the system
    #[arg(long)]
    no_start: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config =
        SystemConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.packages.extend(args.packages);

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Saga v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = Orchestrator::with_builtins();
    let loaded = orchestrator.initialize(config).await?;

    if loaded.is_empty() {
        info!("No packages loaded");
    } else {
        info!("Loaded packages:");
        for package in orchestrator.modules().list_packages() {
            info!("  - {} v{} ({})", package.name(), package.version(), package.path.display());
        }
    }

    if args.no_start {
        orchestrator.shutdown().await;
        return Ok(());
    }

    orchestrator.start().await;

    let commands = orchestrator.modules().get_all_commands();
    if !commands.is_empty() {
        let mut names: Vec<_> = commands.keys().cloned().collect();
        names.sort();
        info!("Available commands: {}", names.join(", "));
    }

    shutdown_signal().await;

    orchestrator.shutdown().await;
    info!("Saga shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}

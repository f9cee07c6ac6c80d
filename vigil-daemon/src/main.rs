use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use vigil_core::{init_observability, shutdown_observability, Config};

mod context;
mod pipeline;
mod shutdown;
mod watcher;

use context::Collectors;
use watcher::InventoryWatcher;

#[derive(Parser)]
#[command(name = "vigild")]
#[command(about = "Node-local VM telemetry daemon", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Port of the Prometheus /metrics listener (overrides the config file)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(vigil_core::paths::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }

    // Initialize observability FIRST
    init_observability(&config.log_level, config.metrics_port)
        .map_err(|e| anyhow::anyhow!("Failed to initialize observability: {}", e))?;

    info!(
        node = %config.node_name,
        socket_dir = %config.socket_dir,
        metrics_port = config.metrics_port,
        "vigild starting"
    );

    let ctx = Arc::new(Collectors::new(config));
    let shutdown_tx = shutdown::shutdown_signal();

    let watcher = Arc::new(InventoryWatcher::new(&ctx));
    let migration_watch = ctx.migrations.watch(&ctx.events);

    let tasks = vec![
        tokio::spawn(watcher.run(ctx.config.inventory_refresh(), shutdown_tx.subscribe())),
        tokio::spawn(pipeline::run_domain_stats(Arc::clone(&ctx), shutdown_tx.subscribe())),
        tokio::spawn(pipeline::run_migration_stats(Arc::clone(&ctx), shutdown_tx.subscribe())),
    ];

    info!("vigild ready");

    shutdown::shutdown(&ctx, tasks).await;
    migration_watch.abort();

    info!("vigild shutting down");
    shutdown_observability();
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use brewd::Config;
use brewd::Engine;
use brewd::EntryStore;
use clap::Parser;
use tokio::sync::oneshot;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Espresso machine integration daemon
#[derive(Parser, Debug)]
#[command(name = "brewd", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(default_value = "brewd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.filter())
        .init();

    tracing::info!("brewd starting");
    tracing::info!("Loaded config from: {}", cli.config.display());

    let store = EntryStore::new(&config.storage.path);
    let engine = Arc::new(Engine::new());
    engine.register_integrations_from_config(&config, &store);

    let runner = engine.clone();
    let engine_task = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            tracing::error!("Engine stopped: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let api_task = if config.api.enabled {
        Some(tokio::spawn(brewd::api::serve(
            config.api.listen.clone(),
            config.api.port,
            engine.clone(),
            shutdown_rx,
        )))
    } else {
        tracing::info!("HTTP API disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    let _ = shutdown_tx.send(());
    if let Some(task) = api_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("HTTP API server failed: {}", e),
            Err(e) => tracing::error!("HTTP API task panicked: {}", e),
        }
    }

    engine.shutdown().await;
    engine_task.abort();

    tracing::info!("brewd stopped");
    Ok(())
}

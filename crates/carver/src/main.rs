use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use carver::app::App;
use carver::config::Cli;
use carver::device::MigCapabilityRegistry;
use carver::device_client::LoggingMigClient;
use carver::k8s::NodeWatcher;
use carver::logging;
use carver::state::ClusterState;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    logging::init();

    info!("Starting gpu-carver");

    let mut capabilities = MigCapabilityRegistry::new();
    if let Some(path) = &cli.gpu_info_path {
        capabilities
            .load_extra(path)
            .await
            .context("failed to load GPU capability file")?;
    }
    let capabilities = Arc::new(capabilities);
    let state = Arc::new(ClusterState::new());

    let cancellation_token = CancellationToken::new();
    {
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            token.cancel();
        });
    }

    let watcher = NodeWatcher::new(cli.kubeconfig.clone(), state.clone());
    let watcher_handle = {
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            if let Err(e) = watcher.run(token).await {
                error!("Node watcher terminated: {e:?}");
            }
        })
    };

    let app = App::new(
        state,
        capabilities,
        Arc::new(LoggingMigClient),
        Duration::from_secs(cli.partitioning_interval_secs),
    );
    app.run(cancellation_token.clone()).await;

    let _ = watcher_handle.await;
    info!("gpu-carver stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

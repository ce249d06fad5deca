//! Partload Server - Main entry point

use anyhow::Result;
use partload_common::logging::{init_logging, LogConfig};
use partload_core::{runtime::build_orchestrator, InvocationAdapter};
use partload_server::{config::Config, router, AppState};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("partload-server")
        .filter_directives("partload_server=debug,partload_core=debug,tower_http=debug")
        .build()
        .with_env_overrides()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting Partload Server");

    let config = Config::load()?;
    info!(
        table = %config.pipeline.target.table,
        bucket = %config.pipeline.source.bucket,
        "Configuration loaded - server will bind to {}",
        config.server.bind_address()
    );

    let orchestrator = Arc::new(build_orchestrator(&config.pipeline).await?);
    let state = AppState::new(Arc::new(InvocationAdapter::new(orchestrator)));
    let app = router(state);

    let addr: SocketAddr = config.server.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}

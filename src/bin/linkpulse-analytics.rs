use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use linkpulse::analytics::{create_analytics_router, open_analytics_store, AnalyticsRepository};
use linkpulse::config::AnalyticsServiceConfig;
use linkpulse::rpc::analytics_grpc_service;
use linkpulse::shutdown::shutdown_signal;
use linkpulse::telemetry::init_tracing;

async fn stopped(mut shutdown_rx: watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AnalyticsServiceConfig::from_env()?;
    init_tracing(&config.log);
    info!("Loaded configuration");

    info!(backend = ?config.database.backend, "Initializing analytics database...");
    let store = open_analytics_store(&config.database)
        .await
        .context("failed to open analytics store")?;
    let repo = Arc::new(AnalyticsRepository::new(store));
    info!("Database initialized successfully");

    let grpc_addr: SocketAddr = config
        .grpc_server
        .addr()
        .parse()
        .with_context(|| format!("invalid gRPC address {}", config.grpc_server.addr()))?;

    let http_addr = config.http_server.addr();
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {http_addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!("🚀 Analytics gRPC server listening on {}", grpc_addr);
    info!("🚀 Analytics HTTP server listening on http://{}", http_addr);

    // Both servers stop on the same signal; one failing stops the process
    tokio::try_join!(
        async {
            tonic::transport::Server::builder()
                .add_service(analytics_grpc_service(Arc::clone(&repo)))
                .serve_with_shutdown(grpc_addr, stopped(shutdown_rx.clone()))
                .await
                .context("gRPC server failed")
        },
        async {
            axum::serve(http_listener, create_analytics_router(Arc::clone(&repo)))
                .with_graceful_shutdown(stopped(shutdown_rx.clone()))
                .await
                .context("HTTP server failed")
        },
    )?;

    info!("Analytics service stopped");
    Ok(())
}

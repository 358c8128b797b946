use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use linkpulse::api::{self, AppState, RateLimiter, TrustedProxies};
use linkpulse::config::Config;
use linkpulse::rpc::{spawn_reconnect_monitor, ClickRecorder, ResilientAnalyticsClient};
use linkpulse::shortener::ShortenerService;
use linkpulse::shutdown::shutdown_signal;
use linkpulse::storage::{open_url_store, UrlRepository};
use linkpulse::telemetry::init_tracing;

const RATE_LIMIT_CLEANUP_PERIOD: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log);
    info!("Loaded configuration");

    info!(backend = ?config.database.backend, "Initializing database...");
    let store = open_url_store(&config.database)
        .await
        .context("failed to open URL store")?;
    info!("Database initialized successfully");

    let repository = Arc::new(UrlRepository::new(store, &config.cache));
    if config.cache.enabled {
        info!(
            max_entries = config.cache.max_entries,
            ttl_secs = config.cache.ttl_secs,
            "URL cache enabled"
        );
    } else {
        info!("URL cache disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let analytics = Arc::new(
        ResilientAnalyticsClient::from_config(&config.analytics_client)
            .context("failed to configure analytics client")?,
    );
    let monitor = spawn_reconnect_monitor(
        Arc::clone(&analytics),
        Duration::from_secs(config.analytics_client.probe_interval_secs),
        shutdown_rx.clone(),
    );

    let trusted_proxies = Arc::new(
        TrustedProxies::parse(&config.rate_limit.trusted_proxies)
            .context("invalid TRUSTED_PROXIES")?,
    );

    let (rate_limiter, cleanup) = if config.rate_limit.enabled {
        info!(
            create = config.rate_limit.create_per_minute,
            access = config.rate_limit.access_per_minute,
            general = config.rate_limit.general_per_minute,
            "Rate limiting enabled"
        );
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.clone(),
            Arc::clone(&trusted_proxies),
        ));
        let cleanup = api::spawn_cleanup(
            Arc::clone(&limiter),
            RATE_LIMIT_CLEANUP_PERIOD,
            shutdown_rx.clone(),
        );
        (Some(limiter), Some(cleanup))
    } else {
        warn!("Rate limiting is disabled");
        (None, None)
    };

    let service = Arc::new(ShortenerService::new(
        Arc::clone(&repository),
        analytics as Arc<dyn ClickRecorder>,
    ));
    let state = Arc::new(AppState {
        service,
        trusted_proxies,
    });
    let router = api::create_router(state, rate_limiter);

    let addr = config.api_server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Shortener listening on http://{}", addr);
    info!("   - API endpoints available at http://{}/api/v1/", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    repository.shutdown();
    let _ = monitor.await;
    if let Some(cleanup) = cleanup {
        let _ = cleanup.await;
    }
    info!("Shortener stopped");

    Ok(())
}

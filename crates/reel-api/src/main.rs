//! Axum API server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};

use reel_api::{create_router, metrics, ApiConfig, AppState};
use reel_worker::{init_tracing, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting reel-api");

    let config = ApiConfig::from_env();
    let worker = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, storage_root={}",
        config.host,
        config.port,
        worker.storage_root.display()
    );

    // Installed first so counters recorded during recovery are exported
    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Prometheus recorder unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let state = match AppState::new(config.clone(), &worker).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {:#}", e);
            std::process::exit(1);
        }
    };

    // Settle leftover jobs before accepting new ones
    if let Err(e) = state.recover().await {
        error!("Crash recovery failed: {:#}", e);
        std::process::exit(1);
    }

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address {}:{}: {}", config.host, config.port, e);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

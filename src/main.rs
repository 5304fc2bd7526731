//! Swap Coordinator - hash-locked cross-chain swap service
//!
//! Serves the swap API, polls escrow readiness for every live swap and
//! releases secrets as fills become ready.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use swap_coordinator::api::{self, AppState};
use swap_coordinator::config::Settings;
use swap_coordinator::ledger::SqliteLedger;
use swap_coordinator::metrics::MetricsServer;
use swap_coordinator::orderbook::FusionPlusClient;
use swap_coordinator::OrderCoordinator;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Swap Coordinator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    // Open the ledger (runs migrations)
    let ledger = Arc::new(SqliteLedger::new(&settings.database).await?);
    info!("Ledger ready at {}", settings.database.url);

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        Some(MetricsServer::new(settings.metrics.port))
    } else {
        None
    };

    // Order book client serves as both quoter and book
    let client = Arc::new(FusionPlusClient::new(&settings.order_book)?);

    let coordinator = Arc::new(OrderCoordinator::new(
        client.clone(),
        client,
        ledger.clone(),
        settings.coordinator_config(),
    ));

    // Resume swaps left unfinished by the previous run
    let resumed = coordinator.recover().await?;
    info!("Order coordinator initialized with {} resumed swaps", resumed);

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            coordinator: coordinator.clone(),
            ledger: ledger.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Start scheduler
    let scheduler_handle = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            if let Err(e) = coordinator.run().await {
                error!("Order coordinator error: {}", e);
            }
        }
    });

    // Ledger health loop
    let health_handle = tokio::spawn({
        let ledger = ledger.clone();
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
                if let Err(e) = ledger.health_check().await {
                    warn!("Ledger health check failed: {}", e);
                }
            }
        }
    });

    info!("Swap Coordinator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    coordinator.stop().await;

    // Abort background tasks
    api_handle.abort();
    scheduler_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Swap Coordinator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,swap_coordinator=debug,audit=info,sqlx=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

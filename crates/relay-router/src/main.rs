//! Relay router
//!
//! Node directory, room placement and enrollment authority for the relay mesh.

#![warn(clippy::pedantic)]

use common::clock::{Clock, SystemClock};
use relay_router::config::Config;
use relay_router::observability::metrics::init_metrics_recorder;
use relay_router::registry::NodeRegistry;
use relay_router::routes::{self, AppState};
use relay_router::services::router_secret;
use relay_router::tasks::{self, SweepTargets};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_router=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting relay router");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        router_id = %config.router_id,
        data_dir = %config.data_dir.display(),
        open_join = config.open_join,
        sticky_ttl_seconds = config.sticky_ttl_seconds,
        node_online_ttl_seconds = config.node_online_ttl_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let router_secret = router_secret::load_or_generate(&config.router_secret_path()).map_err(|e| {
        error!(error = %e, "Failed to load router secret");
        e
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let snapshot_path = config.snapshot_path();
    let registry = Arc::new(NodeRegistry::load(&snapshot_path, clock.clone()));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        e
    })?;
    let drain = Duration::from_secs(config.drain_seconds);

    let state = Arc::new(AppState::new(config, registry.clone(), router_secret, clock));

    let shutdown_token = CancellationToken::new();

    let flush_handle = tokio::spawn(tasks::start_registry_flush(
        registry.clone(),
        snapshot_path,
        tasks::DEFAULT_FLUSH_DEBOUNCE,
        shutdown_token.child_token(),
    ));

    let sweeper_handle = tokio::spawn(tasks::start_sweeper(
        SweepTargets {
            registry,
            sticky: state.sticky.clone(),
            enrollment: state.enrollment.clone(),
            node_online_ttl_ms: state.config.node_online_ttl_ms(),
        },
        Duration::from_secs(tasks::DEFAULT_SWEEP_INTERVAL_SECONDS),
        shutdown_token.child_token(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
        e
    })?;
    info!(addr = %addr, "Relay router listening");

    let server_token = shutdown_token.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!(drain_secs = drain.as_secs(), "Draining connections");
        server_token.cancel();
        tokio::time::sleep(drain).await;
    })
    .await?;

    shutdown_token.cancel();
    if let Err(e) = sweeper_handle.await {
        error!(error = %e, "Sweeper task panicked");
    }
    if let Err(e) = flush_handle.await {
        error!(error = %e, "Registry flush task panicked");
    }

    info!("Relay router shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

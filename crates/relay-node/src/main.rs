//! Relay node
//!
//! Hosts chat rooms and relays messages for the relay mesh.
//!
//! # Startup
//!
//! 1. Load configuration
//! 2. Install the metrics recorder
//! 3. Resolve credentials (environment, credentials file, or enrollment)
//! 4. Spawn the heartbeat and room sweep tasks
//! 5. Serve the public and operator listeners until SIGINT/SIGTERM

#![warn(clippy::pedantic)]

use common::clock::{Clock, SystemClock};
use relay_node::config::Config;
use relay_node::credentials;
use relay_node::observability::metrics::init_metrics_recorder;
use relay_node::rooms::{RoomLimits, RoomManager};
use relay_node::router_client::RouterClient;
use relay_node::routes::{self, AppState};
use relay_node::tasks::{self, HeartbeatSender};
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
                .unwrap_or_else(|_| "relay_node=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting relay node");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        public_url = %config.public_url,
        router_url = %config.router_url,
        bind_address = %config.bind_address,
        operator_bind_address = %config.operator_bind_address,
        max_rooms = config.max_rooms,
        max_users_per_room = config.max_users_per_room,
        room_idle_ttl_seconds = config.room_idle_ttl_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let router = RouterClient::new(&config.router_url)?;
    let (creds, source) = credentials::resolve(&config, &router).await.map_err(|e| {
        error!(error = %e, "Failed to resolve node credentials");
        e
    })?;
    info!(node_key = %creds.node_key, source = source.as_str(), "Node credentials ready");

    let public_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        e
    })?;
    let operator_addr: SocketAddr = config.operator_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.operator_bind_address, "Invalid operator bind address");
        e
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rooms = Arc::new(RoomManager::new(
        RoomLimits {
            max_rooms: config.max_rooms,
            max_users_per_room: config.max_users_per_room,
            idle_ttl_ms: config.room_idle_ttl_ms(),
        },
        clock.clone(),
    ));

    let shutdown_token = CancellationToken::new();
    let state = Arc::new(AppState::new(
        &creds,
        config.public_url.clone(),
        rooms.clone(),
        clock.clone(),
        shutdown_token.child_token(),
    ));

    let heartbeat_handle = tokio::spawn(tasks::start_heartbeat_task(
        HeartbeatSender {
            client: router,
            credentials: creds,
            public_url: config.public_url.clone(),
            rooms: rooms.clone(),
            clock,
        },
        Duration::from_secs(config.heartbeat_interval_seconds),
        shutdown_token.child_token(),
    ));

    let sweeper_handle = tokio::spawn(tasks::start_room_sweeper(
        rooms,
        Duration::from_secs(config.room_sweep_interval_seconds),
        shutdown_token.child_token(),
    ));

    // Bind both listeners before serving to fail fast on bind errors
    let public_listener = tokio::net::TcpListener::bind(public_addr).await.map_err(|e| {
        error!(error = %e, addr = %public_addr, "Failed to bind public listener");
        e
    })?;
    let operator_listener = tokio::net::TcpListener::bind(operator_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %operator_addr, "Failed to bind operator listener");
            e
        })?;

    let operator_app = routes::build_operator_routes(state.clone());
    let operator_token = shutdown_token.child_token();
    let operator_handle = tokio::spawn(async move {
        info!(addr = %operator_addr, "Operator listener started");
        if let Err(e) = axum::serve(operator_listener, operator_app)
            .with_graceful_shutdown(async move { operator_token.cancelled().await })
            .await
        {
            error!(error = %e, "Operator listener failed");
        }
    });

    let app = routes::build_routes(state, metrics_handle);
    info!(addr = %public_addr, "Relay node listening");

    let drain = Duration::from_secs(config.drain_seconds);
    let server_token = shutdown_token.clone();
    axum::serve(
        public_listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!(drain_secs = drain.as_secs(), "Closing sessions and draining connections");
        server_token.cancel();
        tokio::time::sleep(drain).await;
    })
    .await?;

    shutdown_token.cancel();
    for (name, handle) in [
        ("heartbeat", heartbeat_handle),
        ("room sweeper", sweeper_handle),
        ("operator listener", operator_handle),
    ] {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "Task panicked");
        }
    }

    info!("Relay node shutdown complete");
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

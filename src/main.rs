// Main entry point - Dependency injection, poller and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{future::IntoFuture, net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{routing::get, Router};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::poller::{run_poller, SnapshotStore};
use crate::application::tracker_service::TrackerService;
use crate::infrastructure::config::load_tracker_config;
use crate::infrastructure::stride_repository::StrideRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_sensors, get_snapshot, get_tracker, health_check};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_tracker_config().context("Failed to load tracker configuration")?;
    let settings = config.tracker.validate().context("Invalid tracker configuration")?;

    // Create repository (infrastructure layer)
    let repository = Arc::new(StrideRepository::new(&config.stride, settings.timezone)?);

    // Create service and shared state (application layer)
    let update_interval = settings.update_interval;
    let route_mkt = settings.route_mkt.clone();
    let service = TrackerService::new(repository, settings);
    let store = SnapshotStore::new();

    let state = Arc::new(AppState {
        store: store.clone(),
        route_mkt: route_mkt.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/snapshot", get(get_snapshot))
        .route("/sensors", get(get_sensors))
        .route("/tracker", get(get_tracker))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Tracking route_mkt {} on {}", route_mkt, addr);

    let poller = tokio::spawn(run_poller(service, store, update_interval));

    tokio::select! {
        result = axum::serve(listener, router).into_future() => result?,
        result = poller => return Err(poller_exited(result)),
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}

/// The poller loops forever, so any exit is a failure.
fn poller_exited(result: Result<(), tokio::task::JoinError>) -> anyhow::Error {
    match result {
        Ok(()) => anyhow::anyhow!("Poller exited unexpectedly"),
        Err(e) => anyhow::Error::new(e).context("Poller task failed"),
    }
}

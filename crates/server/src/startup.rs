use std::net::SocketAddr;

use axum::Router;
use configs::AppConfig;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{errors::StartupError, routes, state::AppState};
use service::{kv, StoryStore};

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

/// Read `config.toml`/environment once at process start.
pub fn load_config() -> Result<AppConfig, StartupError> {
    AppConfig::load_and_validate().map_err(|e| StartupError::InvalidConfig(e.to_string()))
}

/// Construct the store backend and application state from config.
pub fn build_state(cfg: &AppConfig) -> Result<AppState, StartupError> {
    let backend = kv::from_config(&cfg.store).map_err(|e| StartupError::Store(e.to_string()))?;
    info!(backend = ?cfg.store.backend, decode_values = cfg.store.decode_values, "story store ready");
    Ok(AppState::new(StoryStore::new(backend), cfg.store.list_limit))
}

pub fn build_app(cfg: &AppConfig) -> Result<Router, StartupError> {
    let state = build_state(cfg)?;
    Ok(routes::build_router(state, build_cors()))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(service = "server", event = "shutdown_signal", "received Ctrl+C, shutting down"),
        Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
    }
}

/// Public entry: build the app from `cfg` and run the HTTP server until Ctrl+C.
pub async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let app = build_app(&cfg)?;

    let addr: SocketAddr = cfg.server.bind_addr().parse()?;
    info!(%addr, "starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

//! OpenF1 Replay Server
//!
//! Main server application with web UI and REST API

use anyhow::Result;
use clap::Parser;
use ofr_server::config::{Cli, ServerConfig};
use ofr_server::{api, state};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;

    info!("Starting OpenF1 Replay Server");

    // Create application state
    let state = state::AppState::from_config(&config);
    info!("Telemetry source: {}", state.telemetry.name());

    // Build the router
    let app = api::create_router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    ofr_server::runtime::stop(&state).await;
    info!("Server stopped");
    Ok(())
}

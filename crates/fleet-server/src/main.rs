//! Fleet Server - always-on dispatch backend with per-drone flight simulation

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_server::config::Config;
use fleet_server::state::AppState;
use fleet_server::{api, FleetService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("fleet_server=debug".parse()?))
        .init();

    tracing::info!("Starting Fleet Server...");

    let config = Config::from_env();
    let port = config.server_port;
    let state = Arc::new(AppState::new(config.grid_size));
    let service = Arc::new(FleetService::new(state, config.simulation()));

    // Pick up drones that were airborne when the previous process exited
    service.resume();

    let app = api::routes()
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tracing::{error, info};

use nlq_backend::api::handlers::AppState;
use nlq_backend::api::routes::create_router_with_state;
use nlq_backend::config::Config;
use nlq_backend::services::pipeline::spawn_maintenance;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so the log filter can come from it
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(config.logging.style != "never")
        .init();

    info!("Starting server on {}", config.server_address());

    let (state, worker) = AppState::initialize(&config).await.map_err(|e| {
        error!("Failed to initialize application: {:#}", e);
        e
    })?;
    let background = worker.spawn();
    let maintenance = spawn_maintenance(state.pipeline.clone(), MAINTENANCE_INTERVAL);

    let app: Router = create_router_with_state(state);

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .context("Invalid server address")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    maintenance.abort();
    background.abort();
    Ok(())
}

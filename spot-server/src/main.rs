use std::net::SocketAddr;

use spot_server::{Config, ServerState, api, init_logger_with_file};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env, logging)
    let _ = dotenvy::dotenv();
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    init_logger_with_file(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!(
        environment = %config.environment,
        data_dir = %config.data_dir.display(),
        "Starting spot-server"
    );

    // 2. State and background housekeeping
    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = ServerState::initialize(config).await?;
    let sweeper = state.spawn_sweeper();

    // 3. HTTP server
    let app = api::build_app(&state);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!("HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("spot-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

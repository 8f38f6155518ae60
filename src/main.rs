use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};
use ephemeral_share::{config::Config, routes::create_router, storage, utils::init_logger, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing; the guard flushes file logs on exit
    let _log_guard = init_logger(&config.logging);
    info!("Configuration loaded: {:?}", config.server);

    // Connect to object storage
    let store = storage::create_store(&config.storage)
        .map_err(|e| anyhow::anyhow!("Failed to initialize object store: {}", e))?;
    info!(
        provider = store.name(),
        ttl = %config.upload.ttl_label(),
        max_upload_bytes = config.upload.max_file_size,
        "Object store ready"
    );

    // Create shared state
    let state = AppState::new(config.clone(), store);

    // Create router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

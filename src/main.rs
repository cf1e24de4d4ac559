use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tessera::config::Config;
use tessera::engine::Engine;
use tessera::server::routes::build_router;
use tessera::server::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env
    let _ = dotenvy::dotenv();

    // Load config first (needed for logging setup)
    let config = Config::load(None)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .init();
        }
    }

    tracing::info!("tessera starting");
    tessera::metrics::init();

    let engine = match &config.storage.data_dir {
        Some(dir) => {
            let (engine_config, dir) = (config.engine.clone(), dir.clone());
            tokio::task::spawn_blocking(move || Engine::recover_from(engine_config, &dir))
                .await??
        }
        None => Engine::new(config.engine.clone()),
    };
    let engine = Arc::new(engine);

    let state = AppState::new(Arc::clone(&engine), config.clone());
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %addr, "listening");
    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let (Some(dir), true) = (&config.storage.data_dir, config.storage.snapshot_on_shutdown) {
        let dir = dir.clone();
        let manifest = tokio::task::spawn_blocking(move || engine.snapshot_to(&dir)).await??;
        tracing::info!(snapshot = %manifest.id, "snapshot written on shutdown");
    }
    tracing::info!("tessera stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

use std::path::PathBuf;
use std::sync::Arc;
use scoregate_core::config::GatewayConfig;
use scoregate_core::engine::RecognitionEngine;
use scoregate_core::executors::LocalExecutor;
use scoregate_core::http::{build_router, AppState};
use scoregate_core::janitor::Janitor;
use scoregate_core::workspace::WorkspaceRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let config_path = std::env::var_os("SCOREGATE_CONFIG").map(PathBuf::from);
    let config = match GatewayConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    config.validate()?;
    let config = Arc::new(config);

    log::info!("Using workspace root {:?}", config.workspace_root);
    let registry = Arc::new(WorkspaceRegistry::new(config.workspace_root.clone()).await?);
    if let Err(e) = registry.adopt_orphans().await {
        log::warn!("Could not scan for orphaned workspaces: {}", e);
    }

    Janitor::new(
        Arc::clone(&registry),
        config.session_timeout(),
        config.sweep_interval(),
    )
    .spawn();

    let executor = Arc::new(LocalExecutor::new(config.engines.clone()));
    let engine = RecognitionEngine::new(Arc::clone(&config), registry, executor);
    for (variant, available) in engine.engine_status() {
        if available {
            log::info!("Engine {} is available", variant);
        } else {
            log::warn!("Engine {} is not installed; requests for it will fail", variant);
        }
    }

    let app = build_router(AppState::new(engine));
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    log::info!("Starting HTTP server on {}", address);
    match axum::serve(listener, app).await {
        Ok(_) => log::info!("HTTP server stopped gracefully"),
        Err(e) => {
            log::error!("HTTP server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

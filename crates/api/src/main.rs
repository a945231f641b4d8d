//! FITKIT notification API server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use fitkit_common::config::AppConfig;
use fitkit_common::db::{create_pool, migrate};
use fitkit_engine::Scheduler;

use fitkit_api::routes::create_router;
use fitkit_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "fitkit_api=debug,fitkit_engine=debug,fitkit_notifier=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting FITKIT notification API server...");

    let config = AppConfig::from_env()?;
    config.log_missing_providers();

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    migrate(&pool).await?;
    tracing::info!("Database pool created and migrations applied");

    let port = config.api_port;
    let scheduler_enabled = config.scheduler_enabled;
    let state = AppState::new(pool, config);

    if scheduler_enabled {
        Scheduler::global().start(state.engine.clone()).await;
    } else {
        tracing::info!("Scheduler disabled by configuration");
    }

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Scheduler::global().stop().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

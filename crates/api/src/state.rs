//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use fitkit_common::config::AppConfig;
use fitkit_engine::EngineContext;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub engine: EngineContext,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let engine = EngineContext::from_config(pool.clone(), &config);
        Self::with_engine(config, engine)
    }

    /// State around a prebuilt engine, e.g. one wired to fake channels.
    pub fn with_engine(config: AppConfig, engine: EngineContext) -> Self {
        Self {
            pool: engine.pool.clone(),
            config: Arc::new(config),
            engine,
        }
    }
}

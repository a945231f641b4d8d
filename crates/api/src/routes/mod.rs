pub mod health;
pub mod notifications;
pub mod phone;
pub mod preferences;
pub mod scheduler;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(phone::router())
        .merge(preferences::router())
        .merge(notifications::router())
        .merge(scheduler::router())
        .with_state(state)
}

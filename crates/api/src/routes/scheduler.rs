use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use fitkit_common::error::AppError;
use fitkit_engine::Scheduler;
use fitkit_engine::scheduler::SchedulerOverview;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications/scheduler/status", get(scheduler_status))
}

/// GET /api/notifications/scheduler/status: Running flag, user counts and next job runs.
async fn scheduler_status(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<SchedulerOverview>, AppError> {
    let overview = Scheduler::global()
        .overview(&state.pool, state.engine.offset)
        .await?;
    Ok(Json(overview))
}

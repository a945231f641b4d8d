//! History, statistics and on-demand notification routes.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use fitkit_common::error::AppError;
use fitkit_common::types::NotificationLog;
use fitkit_engine::history::{HistoryService, NotificationStats};
use fitkit_engine::jobs::{self, ReportDelivery};
use fitkit_engine::report::{ReportType, ReportWindow};
use fitkit_engine::users::UserService;
use fitkit_notifier::DeliveryOutcome;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportPdfRequest {
    pub report_type: String,
    pub days_back: Option<i64>,
}

impl ExportPdfRequest {
    pub fn window(&self) -> Result<ReportWindow, AppError> {
        let report_type: ReportType = self.report_type.parse()?;
        ReportWindow::new(report_type, self.days_back)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/history", get(history))
        .route("/api/notifications/stats", get(stats))
        .route("/api/notifications/test-reminder", post(test_reminder))
        .route("/api/notifications/send-daily-summary", post(send_daily_summary))
        .route("/api/notifications/send-weekly-summary", post(send_weekly_summary))
        .route("/api/notifications/export-pdf", post(export_pdf))
}

/// GET /api/notifications/history: Newest first, `limit` capped at 100.
async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<NotificationLog>>, AppError> {
    let logs = HistoryService::list(&state.pool, auth.user_id, query.limit).await?;
    Ok(Json(logs))
}

/// GET /api/notifications/stats: Delivery totals for the last 30 days.
async fn stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<NotificationStats>, AppError> {
    let user = UserService::get(&state.pool, auth.user_id).await?;
    let stats = HistoryService::stats(&state.pool, &user).await?;
    Ok(Json(stats))
}

async fn test_reminder(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DeliveryOutcome>, AppError> {
    let outcome = jobs::send_manual_reminder(&state.engine, auth.user_id).await?;
    Ok(Json(outcome))
}

async fn send_daily_summary(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DeliveryOutcome>, AppError> {
    let outcome = jobs::send_daily_summary_now(&state.engine, auth.user_id).await?;
    Ok(Json(outcome))
}

async fn send_weekly_summary(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DeliveryOutcome>, AppError> {
    let outcome = jobs::send_weekly_summary_now(&state.engine, auth.user_id).await?;
    Ok(Json(outcome))
}

/// POST /api/notifications/export-pdf: Render a report and send it to every channel.
async fn export_pdf(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<ExportPdfRequest>,
) -> Result<Json<ReportDelivery>, AppError> {
    let window = req.window()?;
    tracing::info!(
        user_id = %auth.user_id,
        report_type = window.report_type.as_str(),
        days = window.days,
        "PDF export requested"
    );
    let delivery = jobs::generate_and_send_report(&state.engine, auth.user_id, window).await?;
    Ok(Json(delivery))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(report_type: &str, days_back: Option<i64>) -> ExportPdfRequest {
        ExportPdfRequest {
            report_type: report_type.to_string(),
            days_back,
        }
    }

    #[test]
    fn test_export_window_defaults() {
        let window = request("quarterly", None).window().unwrap();
        assert_eq!(window.report_type, ReportType::Quarterly);
        assert_eq!(window.days, 90);

        let custom = request("custom", Some(14)).window().unwrap();
        assert_eq!(custom.days, 14);
    }

    #[test]
    fn test_export_window_rejects_bad_input() {
        assert!(matches!(
            request("yearly", None).window(),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            request("weekly", Some(0)).window(),
            Err(AppError::Validation(_))
        ));
    }
}

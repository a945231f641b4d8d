//! WhatsApp phone verification routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use fitkit_common::error::AppError;
use fitkit_engine::otp::{OtpSent, OtpService, PhoneStatus};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/phone/send-otp", post(send_otp))
        .route("/api/notifications/phone/verify-otp", post(verify_otp))
        .route("/api/notifications/phone/status", get(phone_status))
}

/// POST /api/notifications/phone/send-otp: Store the number and send a code over WhatsApp.
async fn send_otp(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<SendOtpRequest>,
) -> Result<Json<OtpSent>, AppError> {
    let sent = OtpService::send(&state.engine, auth.user_id, &req.phone_number).await?;
    Ok(Json(sent))
}

/// POST /api/notifications/phone/verify-otp: Consume a code and mark the phone verified.
async fn verify_otp(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = OtpService::verify(&state.engine, auth.user_id, &req.otp).await?;
    Ok(Json(json!({
        "verified": true,
        "phone_number": user.phone_number,
        "phone_verified": user.phone_verified,
    })))
}

/// GET /api/notifications/phone/status
async fn phone_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PhoneStatus>, AppError> {
    let status = OtpService::status(&state.engine, auth.user_id).await?;
    Ok(Json(status))
}

//! Notification preference routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use fitkit_common::error::AppError;
use fitkit_common::types::{NotificationPreferences, User};
use fitkit_engine::preferences::{PreferenceService, UpdatePreferencesParams};
use fitkit_engine::users::UserService;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Preferences plus the contact facts the settings screen needs.
#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    #[serde(flatten)]
    pub preferences: NotificationPreferences,
    pub phone_verified: bool,
    pub email_available: bool,
}

impl PreferencesResponse {
    pub fn new(preferences: NotificationPreferences, user: &User) -> Self {
        Self {
            preferences,
            phone_verified: user.phone_verified,
            email_available: user.email.is_some(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/notifications/preferences",
        get(get_preferences).put(update_preferences),
    )
}

/// GET /api/notifications/preferences: Stored preferences, or defaults when none exist.
async fn get_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PreferencesResponse>, AppError> {
    let user = UserService::get(&state.pool, auth.user_id).await?;
    let prefs = PreferenceService::get(&state.pool, auth.user_id).await?;
    Ok(Json(PreferencesResponse::new(prefs, &user)))
}

/// PUT /api/notifications/preferences: Partial update; unspecified fields keep their value.
async fn update_preferences(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<UpdatePreferencesParams>,
) -> Result<Json<NotificationPreferences>, AppError> {
    let prefs = PreferenceService::update(&state.pool, auth.user_id, &params).await?;
    tracing::info!(user_id = %auth.user_id, "Notification preferences updated");
    Ok(Json(prefs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_response_flattens_preferences_with_contact_flags() {
        let user = User {
            id: Uuid::new_v4(),
            email: None,
            name: None,
            phone_number: Some("+15551234567".to_string()),
            phone_verified: true,
            last_meal_at: None,
            daily_calorie_goal: 2000.0,
            daily_protein_goal: 60.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let prefs = NotificationPreferences::defaults_for(user.id);

        let json = serde_json::to_value(PreferencesResponse::new(prefs, &user)).unwrap();

        assert_eq!(json["reminder_frequency"], 5);
        assert_eq!(json["quiet_hours_start"], 22);
        assert_eq!(json["phone_verified"], true);
        assert_eq!(json["email_available"], false);
    }
}

//! Preference service: read preferences merged over defaults, apply validated
//! partial updates.

use sqlx::PgPool;
use uuid::Uuid;

use fitkit_common::error::AppError;
use fitkit_common::types::NotificationPreferences;

pub struct PreferenceService;

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdatePreferencesParams {
    pub whatsapp_enabled: Option<bool>,
    pub email_enabled: Option<bool>,
    pub reminder_frequency: Option<i32>,
    pub daily_summary: Option<bool>,
    pub weekly_summary: Option<bool>,
    pub monthly_summary: Option<bool>,
    pub quiet_hours_start: Option<i32>,
    pub quiet_hours_end: Option<i32>,
}

impl UpdatePreferencesParams {
    pub fn is_empty(&self) -> bool {
        self.whatsapp_enabled.is_none()
            && self.email_enabled.is_none()
            && self.reminder_frequency.is_none()
            && self.daily_summary.is_none()
            && self.weekly_summary.is_none()
            && self.monthly_summary.is_none()
            && self.quiet_hours_start.is_none()
            && self.quiet_hours_end.is_none()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.is_empty() {
            return Err(AppError::Validation("No preferences provided".to_string()));
        }
        if let Some(freq) = self.reminder_frequency
            && !(1..=24).contains(&freq)
        {
            return Err(AppError::Validation(
                "reminder_frequency must be between 1 and 24 hours".to_string(),
            ));
        }
        for (field, value) in [
            ("quiet_hours_start", self.quiet_hours_start),
            ("quiet_hours_end", self.quiet_hours_end),
        ] {
            if let Some(hour) = value
                && !(0..=23).contains(&hour)
            {
                return Err(AppError::Validation(format!(
                    "{field} must be between 0 and 23"
                )));
            }
        }
        Ok(())
    }

    /// Overlay the set fields onto `current`.
    pub fn apply(&self, current: &NotificationPreferences) -> NotificationPreferences {
        NotificationPreferences {
            user_id: current.user_id,
            whatsapp_enabled: self.whatsapp_enabled.unwrap_or(current.whatsapp_enabled),
            email_enabled: self.email_enabled.unwrap_or(current.email_enabled),
            reminder_frequency: self.reminder_frequency.unwrap_or(current.reminder_frequency),
            daily_summary: self.daily_summary.unwrap_or(current.daily_summary),
            weekly_summary: self.weekly_summary.unwrap_or(current.weekly_summary),
            monthly_summary: self.monthly_summary.unwrap_or(current.monthly_summary),
            quiet_hours_start: self.quiet_hours_start.unwrap_or(current.quiet_hours_start),
            quiet_hours_end: self.quiet_hours_end.unwrap_or(current.quiet_hours_end),
        }
    }
}

impl PreferenceService {
    /// Stored preferences, or defaults when the user never saved any.
    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<NotificationPreferences, AppError> {
        let stored: Option<NotificationPreferences> =
            sqlx::query_as("SELECT * FROM notification_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(stored.unwrap_or_else(|| NotificationPreferences::defaults_for(user_id)))
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        params: &UpdatePreferencesParams,
    ) -> Result<NotificationPreferences, AppError> {
        params.validate()?;

        let current = Self::get(pool, user_id).await?;
        let next = params.apply(&current);

        let saved: NotificationPreferences = sqlx::query_as(
            r#"
            INSERT INTO notification_preferences (
                user_id, whatsapp_enabled, email_enabled, reminder_frequency,
                daily_summary, weekly_summary, monthly_summary,
                quiet_hours_start, quiet_hours_end
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE SET
                whatsapp_enabled = EXCLUDED.whatsapp_enabled,
                email_enabled = EXCLUDED.email_enabled,
                reminder_frequency = EXCLUDED.reminder_frequency,
                daily_summary = EXCLUDED.daily_summary,
                weekly_summary = EXCLUDED.weekly_summary,
                monthly_summary = EXCLUDED.monthly_summary,
                quiet_hours_start = EXCLUDED.quiet_hours_start,
                quiet_hours_end = EXCLUDED.quiet_hours_end,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(next.whatsapp_enabled)
        .bind(next.email_enabled)
        .bind(next.reminder_frequency)
        .bind(next.daily_summary)
        .bind(next.weekly_summary)
        .bind(next.monthly_summary)
        .bind(next.quiet_hours_start)
        .bind(next.quiet_hours_end)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            user_id = %user_id,
            reminder_frequency = saved.reminder_frequency,
            whatsapp_enabled = saved.whatsapp_enabled,
            email_enabled = saved.email_enabled,
            "Notification preferences updated"
        );

        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_update_rejected() {
        let err = UpdatePreferencesParams::default().validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_reminder_frequency_range() {
        for freq in [0, 25, -3] {
            let params = UpdatePreferencesParams {
                reminder_frequency: Some(freq),
                ..Default::default()
            };
            assert!(params.validate().is_err(), "frequency {freq} accepted");
        }
        for freq in [1, 5, 24] {
            let params = UpdatePreferencesParams {
                reminder_frequency: Some(freq),
                ..Default::default()
            };
            assert!(params.validate().is_ok());
        }
    }

    #[test]
    fn test_quiet_hours_range() {
        let params = UpdatePreferencesParams {
            quiet_hours_start: Some(24),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = UpdatePreferencesParams {
            quiet_hours_end: Some(-1),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = UpdatePreferencesParams {
            quiet_hours_start: Some(0),
            quiet_hours_end: Some(23),
            ..Default::default()
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_apply_only_overrides_set_fields() {
        let current = NotificationPreferences::defaults_for(Uuid::new_v4());
        let params = UpdatePreferencesParams {
            whatsapp_enabled: Some(false),
            quiet_hours_end: Some(8),
            ..Default::default()
        };

        let next = params.apply(&current);
        assert!(!next.whatsapp_enabled);
        assert_eq!(next.quiet_hours_end, 8);
        assert_eq!(next.quiet_hours_start, current.quiet_hours_start);
        assert_eq!(next.reminder_frequency, current.reminder_frequency);
        assert!(next.email_enabled);
    }
}

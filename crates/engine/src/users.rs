//! User lookups used by the jobs and the phone-verification flow.

use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use fitkit_common::error::AppError;
use fitkit_common::types::{DailySummary, NotificationPreferences, User};

/// A user together with their effective preferences.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub user: User,
    pub prefs: NotificationPreferences,
}

pub struct UserService;

impl UserService {
    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<User, AppError> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        Ok(user)
    }

    /// Every user with at least one address on file, with preferences merged
    /// over defaults.
    pub async fn list_reachable(pool: &PgPool) -> Result<Vec<Recipient>, AppError> {
        let users: Vec<User> = sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE (phone_number IS NOT NULL AND phone_verified)
               OR email IS NOT NULL
            ORDER BY created_at
            "#,
        )
        .fetch_all(pool)
        .await?;

        let stored: Vec<NotificationPreferences> =
            sqlx::query_as("SELECT * FROM notification_preferences")
                .fetch_all(pool)
                .await?;
        let mut by_user: HashMap<Uuid, NotificationPreferences> =
            stored.into_iter().map(|p| (p.user_id, p)).collect();

        Ok(users
            .into_iter()
            .map(|user| {
                let prefs = by_user
                    .remove(&user.id)
                    .unwrap_or_else(|| NotificationPreferences::defaults_for(user.id));
                Recipient { user, prefs }
            })
            .collect())
    }

    /// Daily summaries in `[start, end]`, oldest first.
    pub async fn summaries_between(
        pool: &PgPool,
        user_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>, AppError> {
        let rows: Vec<DailySummary> = sqlx::query_as(
            r#"
            SELECT * FROM daily_summaries
            WHERE user_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn summary_for(
        pool: &PgPool,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, AppError> {
        let row: Option<DailySummary> = sqlx::query_as("SELECT * FROM daily_summaries WHERE user_id = $1 AND date = $2")
            .bind(user_id)
            .bind(date)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn count_verified_phones(pool: &PgPool) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE phone_number IS NOT NULL AND phone_verified",
        )
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}

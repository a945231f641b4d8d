//! Notification history and delivery statistics read from `notification_logs`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use fitkit_common::error::AppError;
use fitkit_common::types::{DeliveryStatus, NotificationKind, NotificationLog, User};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const STATS_PERIOD_DAYS: i64 = 30;

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub sent: i64,
    pub failed: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationStats {
    pub period_days: i64,
    pub total_notifications: i64,
    pub total_sent: i64,
    pub total_failed: i64,
    /// Percentage of attempts that were sent, one decimal
    pub success_rate: f64,
    pub by_type: BTreeMap<String, StatusCounts>,
    pub phone_verified: bool,
    pub email_available: bool,
}

impl NotificationStats {
    pub fn from_counts(rows: &[(NotificationKind, DeliveryStatus, i64)], user: &User) -> Self {
        let mut by_type: BTreeMap<String, StatusCounts> = BTreeMap::new();
        let mut total = 0;
        let mut sent = 0;
        let mut failed = 0;

        for (kind, status, count) in rows {
            let entry = by_type.entry(kind.to_string()).or_default();
            total += count;
            match status {
                DeliveryStatus::Sent => {
                    entry.sent += count;
                    sent += count;
                }
                DeliveryStatus::Failed => {
                    entry.failed += count;
                    failed += count;
                }
                DeliveryStatus::Pending => entry.pending += count,
            }
        }

        let success_rate = if total > 0 {
            (sent as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Self {
            period_days: STATS_PERIOD_DAYS,
            total_notifications: total,
            total_sent: sent,
            total_failed: failed,
            success_rate,
            by_type,
            phone_verified: user.phone_verified,
            email_available: user.email.is_some(),
        }
    }
}

pub struct HistoryService;

impl HistoryService {
    /// Newest first.
    pub async fn list(
        pool: &PgPool,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<NotificationLog>, AppError> {
        let rows: Vec<NotificationLog> = sqlx::query_as(
            r#"
            SELECT * FROM notification_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(clamp_limit(limit))
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn stats(pool: &PgPool, user: &User) -> Result<NotificationStats, AppError> {
        let rows: Vec<(NotificationKind, DeliveryStatus, i64)> = sqlx::query_as(
            r#"
            SELECT notification_type, status, COUNT(*)
            FROM notification_logs
            WHERE user_id = $1 AND created_at >= NOW() - make_interval(days => $2)
            GROUP BY notification_type, status
            "#,
        )
        .bind(user.id)
        .bind(STATS_PERIOD_DAYS as i32)
        .fetch_all(pool)
        .await?;

        Ok(NotificationStats::from_counts(&rows, user))
    }

    /// Time of the most recent meal reminder attempt, whatever its outcome.
    pub async fn last_meal_reminder_at(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<DateTime<Utc>>, AppError> {
        let at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MAX(created_at) FROM notification_logs
            WHERE user_id = $1 AND notification_type = 'meal_reminder'
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(at)
    }

    pub async fn count_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_logs WHERE created_at >= $1")
                .bind(since)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_user() -> User {
        User {
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
        }
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(500)), 100);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-4)), 1);
    }

    #[test]
    fn test_stats_from_counts() {
        let rows = vec![
            (NotificationKind::MealReminder, DeliveryStatus::Sent, 5),
            (NotificationKind::MealReminder, DeliveryStatus::Failed, 1),
            (NotificationKind::DailySummary, DeliveryStatus::Sent, 2),
            (NotificationKind::DailySummary, DeliveryStatus::Pending, 1),
        ];
        let stats = NotificationStats::from_counts(&rows, &make_user());

        assert_eq!(stats.total_notifications, 9);
        assert_eq!(stats.total_sent, 7);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.success_rate, 77.8);
        assert_eq!(
            stats.by_type["meal_reminder"],
            StatusCounts { sent: 5, failed: 1, pending: 0 }
        );
        assert_eq!(stats.by_type["daily_summary"].pending, 1);
        assert!(stats.phone_verified);
        assert!(!stats.email_available);
    }

    #[test]
    fn test_stats_empty() {
        let stats = NotificationStats::from_counts(&[], &make_user());
        assert_eq!(stats.total_notifications, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.by_type.is_empty());
    }
}

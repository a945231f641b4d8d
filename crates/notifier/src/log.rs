//! Delivery log: one row per channel attempt, created `pending` before the
//! provider is called and moved to `sent` or `failed` afterwards.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use fitkit_common::types::{ChannelType, DeliveryStatus, NotificationKind, NotificationLog};

#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Insert a `pending` row and return its id.
    async fn record_pending(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        channel: ChannelType,
        content: &str,
    ) -> anyhow::Result<Uuid>;

    async fn mark_sent(&self, id: Uuid, provider_message_id: Option<&str>) -> anyhow::Result<()>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> anyhow::Result<()>;
}

/// PostgreSQL-backed log writing to `notification_logs`.
pub struct PgDeliveryLog {
    pool: PgPool,
}

impl PgDeliveryLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryLog for PgDeliveryLog {
    async fn record_pending(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        channel: ChannelType,
        content: &str,
    ) -> anyhow::Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notification_logs (user_id, notification_type, channel, status, message_content)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(channel)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn mark_sent(&self, id: Uuid, provider_message_id: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE notification_logs
            SET status = 'sent', provider_message_id = $2, sent_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE notification_logs SET status = 'failed', error_message = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-process log, used where no database is available (tests, dry runs).
///
/// Besides the current rows it keeps every status a row passed through, so
/// callers can check the pending-then-final sequence.
#[derive(Default)]
pub struct MemoryDeliveryLog {
    rows: Mutex<Vec<NotificationLog>>,
    transitions: Mutex<Vec<(Uuid, DeliveryStatus)>>,
}

impl MemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<NotificationLog> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Statuses `id` passed through, oldest first.
    pub fn transitions(&self, id: Uuid) -> Vec<DeliveryStatus> {
        self.transitions
            .lock()
            .map(|t| {
                t.iter()
                    .filter(|(row, _)| *row == id)
                    .map(|(_, status)| *status)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut NotificationLog)) -> anyhow::Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| anyhow::anyhow!("delivery log lock poisoned"))?;
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown log row {id}"))?;
        apply(row);
        let status = row.status;
        drop(rows);
        self.push_transition(id, status)
    }

    fn push_transition(&self, id: Uuid, status: DeliveryStatus) -> anyhow::Result<()> {
        self.transitions
            .lock()
            .map_err(|_| anyhow::anyhow!("delivery log lock poisoned"))?
            .push((id, status));
        Ok(())
    }
}

#[async_trait]
impl DeliveryLog for MemoryDeliveryLog {
    async fn record_pending(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        channel: ChannelType,
        content: &str,
    ) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.rows
            .lock()
            .map_err(|_| anyhow::anyhow!("delivery log lock poisoned"))?
            .push(NotificationLog {
                id,
                user_id,
                notification_type: kind,
                channel,
                status: DeliveryStatus::Pending,
                message_content: Some(content.to_string()),
                provider_message_id: None,
                error_message: None,
                sent_at: None,
                created_at: Utc::now(),
            });
        self.push_transition(id, DeliveryStatus::Pending)?;
        Ok(id)
    }

    async fn mark_sent(&self, id: Uuid, provider_message_id: Option<&str>) -> anyhow::Result<()> {
        self.update(id, |row| {
            row.status = DeliveryStatus::Sent;
            row.provider_message_id = provider_message_id.map(str::to_string);
            row.sent_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> anyhow::Result<()> {
        self.update(id, |row| {
            row.status = DeliveryStatus::Failed;
            row.error_message = Some(error.to_string());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_log_tracks_transitions() {
        let log = MemoryDeliveryLog::new();
        let user_id = Uuid::new_v4();

        let id = log
            .record_pending(user_id, NotificationKind::MealReminder, ChannelType::Whatsapp, "hi")
            .await
            .unwrap();
        log.mark_sent(id, Some("SM1")).await.unwrap();

        assert_eq!(
            log.transitions(id),
            vec![DeliveryStatus::Pending, DeliveryStatus::Sent]
        );
        let rows = log.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provider_message_id.as_deref(), Some("SM1"));
        assert!(rows[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn test_memory_log_unknown_row() {
        let log = MemoryDeliveryLog::new();
        assert!(log.mark_failed(Uuid::new_v4(), "boom").await.is_err());
    }
}

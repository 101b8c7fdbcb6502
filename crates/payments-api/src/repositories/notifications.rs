//! Device token and notification log repositories

use anyhow::{Context, Result};
use shared::models::NotificationLogEntry;
use shared::DbPool;

pub struct DeviceRepository;

impl DeviceRepository {
    /// Registered FCM token for a user, if any
    pub async fn find_token(pool: &DbPool, user_id: &str) -> Result<Option<String>> {
        let token = sqlx::query_scalar::<_, String>(
            r#"
            SELECT fcm_token FROM user_devices
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch device token")?;

        Ok(token)
    }
}

pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn record(pool: &DbPool, entry: &NotificationLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                user_id, title, body, notification_type, reference, status, error, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.title)
        .bind(&entry.body)
        .bind(&entry.notification_type)
        .bind(&entry.reference)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(entry.sent_at)
        .execute(pool)
        .await
        .context("Failed to insert notification log")?;

        Ok(())
    }
}

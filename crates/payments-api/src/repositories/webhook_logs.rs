//! PostgreSQL webhook audit log

use anyhow::Context;
use async_trait::async_trait;
use shared::models::WebhookLogEntry;
use shared::DbPool;

use super::{StoreError, WebhookAudit};

#[derive(Clone)]
pub struct PgWebhookAudit {
    pool: DbPool,
}

impl PgWebhookAudit {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookAudit for PgWebhookAudit {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_logs (kind, event, reference, payload, error, source_ip, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.kind.as_str())
        .bind(&entry.event)
        .bind(&entry.reference)
        .bind(&entry.payload)
        .bind(&entry.error)
        .bind(&entry.source_ip)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert webhook log")?;

        Ok(())
    }
}

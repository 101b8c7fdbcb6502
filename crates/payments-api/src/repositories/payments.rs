//! PostgreSQL payment store

use anyhow::Context;
use async_trait::async_trait;
use shared::models::{NewPayment, PaymentRecord, StatusTransition};
use shared::DbPool;

use super::{PaymentStore, StoreError, TransitionResult};

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, payment: NewPayment) -> Result<PaymentRecord, StoreError> {
        let reference = payment.reference.clone();

        // ON CONFLICT DO NOTHING returns no row when the reference is taken
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO payments (
                reference, user_id, amount_minor, currency, operator, phone_number,
                status, points_earned, description, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, NOW(), NOW())
            ON CONFLICT (reference) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&payment.reference)
        .bind(&payment.user_id)
        .bind(payment.amount.minor_units())
        .bind(&payment.currency)
        .bind(payment.operator.as_str())
        .bind(&payment.phone_number)
        .bind(payment.points_earned)
        .bind(&payment.description)
        .bind(&payment.metadata)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert payment")?;

        record.ok_or(StoreError::DuplicateReference(reference))
    }

    async fn find(&self, reference: &str) -> Result<Option<PaymentRecord>, StoreError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT * FROM payments
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch payment")?;

        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let records = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT * FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC, reference DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list payments")?;

        Ok(records)
    }

    async fn transition(
        &self,
        reference: &str,
        transition: &StatusTransition,
    ) -> Result<TransitionResult, StoreError> {
        // Compare-and-swap on status: concurrent deliveries of the same event
        // race here and exactly one of them gets a row back
        let updated = sqlx::query_as::<_, PaymentRecord>(
            r#"
            UPDATE payments SET
                status = $2,
                updated_at = $3,
                gateway_payment_id = COALESCE($4, gateway_payment_id),
                transaction_id = COALESCE($5, transaction_id),
                error_message = $6,
                raw_event_payload = COALESCE($7, raw_event_payload),
                confirmed_at = CASE WHEN $2 = 'completed' THEN $3 ELSE confirmed_at END,
                failed_at = CASE WHEN $2 = 'failed' THEN $3 ELSE failed_at END,
                cancelled_at = CASE WHEN $2 = 'cancelled' THEN $3 ELSE cancelled_at END,
                expired_at = CASE WHEN $2 = 'expired' THEN $3 ELSE expired_at END
            WHERE reference = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(reference)
        .bind(transition.to.as_str())
        .bind(transition.at)
        .bind(&transition.gateway_payment_id)
        .bind(&transition.transaction_id)
        .bind(&transition.error_message)
        .bind(&transition.raw_event_payload)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to transition payment")?;

        if let Some(record) = updated {
            return Ok(TransitionResult::Applied(record));
        }

        Ok(match self.find(reference).await? {
            Some(record) => TransitionResult::AlreadyTerminal(record),
            None => TransitionResult::NotFound,
        })
    }

    async fn health(&self) -> Result<(), StoreError> {
        shared::db::check_health(&self.pool)
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}

//! PostgreSQL reward ledger

use anyhow::Context;
use async_trait::async_trait;
use shared::models::{PointsRecord, UserPoints};
use shared::DbPool;

use super::{CreditOutcome, PointsCredit, RewardLedger, StoreError};

/// Origin tag for points earned through payments
pub const PAYMENT_ORIGIN: &str = "payment";

#[derive(Clone)]
pub struct PgRewardLedger {
    pool: DbPool,
}

impl PgRewardLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RewardLedger for PgRewardLedger {
    async fn credit(&self, credit: &PointsCredit) -> Result<CreditOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        // The unique index on payment_reference makes this the idempotency guard
        let history_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO points_records (user_id, points, origin, payment_reference, description, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (payment_reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&credit.user_id)
        .bind(credit.points)
        .bind(PAYMENT_ORIGIN)
        .bind(&credit.payment_reference)
        .bind(&credit.description)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to insert points record")?;

        if history_id.is_none() {
            // Dropping the transaction rolls it back
            return Ok(CreditOutcome::AlreadyCredited);
        }

        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO user_points (user_id, points, total_points_earned, updated_at)
            VALUES ($1, $2, $2, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                points = user_points.points + EXCLUDED.points,
                total_points_earned = user_points.total_points_earned + EXCLUDED.points,
                updated_at = NOW()
            RETURNING points
            "#,
        )
        .bind(&credit.user_id)
        .bind(credit.points)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to update user points")?;

        tx.commit().await.context("Failed to commit points credit")?;

        Ok(CreditOutcome::Credited { balance })
    }

    async fn balance(&self, user_id: &str) -> Result<Option<UserPoints>, StoreError> {
        let points = sqlx::query_as::<_, UserPoints>(
            r#"
            SELECT * FROM user_points
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get user points")?;

        Ok(points)
    }

    async fn history_for(&self, user_id: &str) -> Result<Vec<PointsRecord>, StoreError> {
        let records = sqlx::query_as::<_, PointsRecord>(
            r#"
            SELECT * FROM points_records
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list points records")?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{PaymentStore, PgPaymentStore};
    use serde_json::json;
    use shared::models::{Amount, NewPayment, Operator};
    use sqlx::PgPool;
    use uuid::Uuid;

    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests");

        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        shared::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Insert a payment for a fresh user and return the credit it earns
    async fn seed_credit(pool: &PgPool, points: i64) -> PointsCredit {
        let reference = format!("INFTEST{}", Uuid::new_v4().simple());
        let user_id = format!("test-user-{}", Uuid::new_v4().simple());
        PgPaymentStore::new(pool.clone())
            .insert(NewPayment {
                reference: reference.clone(),
                user_id: user_id.clone(),
                amount: Amount::from_minor(500),
                currency: "MZN".to_string(),
                operator: Operator::Mpesa,
                phone_number: "258841234567".to_string(),
                points_earned: points,
                description: None,
                metadata: json!({}),
            })
            .await
            .expect("Failed to insert test payment");

        PointsCredit {
            user_id,
            points,
            payment_reference: reference.clone(),
            description: Some(format!("Points earned for payment {}", reference)),
        }
    }

    async fn cleanup(pool: &PgPool, credit: &PointsCredit) {
        for statement in [
            "DELETE FROM points_records WHERE user_id = $1",
            "DELETE FROM user_points WHERE user_id = $1",
            "DELETE FROM payments WHERE user_id = $1",
        ] {
            sqlx::query(statement)
                .bind(&credit.user_id)
                .execute(pool)
                .await
                .expect("Failed to clean up test data");
        }
    }

    // Integration tests (require real database)

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL (integration test)
    async fn test_double_credit_is_ignored() {
        let pool = setup_test_db().await;
        let ledger = PgRewardLedger::new(pool.clone());
        let credit = seed_credit(&pool, 6).await;

        let first = ledger.credit(&credit).await.unwrap();
        assert_eq!(first, CreditOutcome::Credited { balance: 6 });

        let second = ledger.credit(&credit).await.unwrap();
        assert_eq!(second, CreditOutcome::AlreadyCredited);

        let balance = ledger.balance(&credit.user_id).await.unwrap().unwrap();
        assert_eq!(balance.points, 6);
        assert_eq!(balance.total_points_earned, 6);

        let history = ledger.history_for(&credit.user_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].origin, PAYMENT_ORIGIN);

        cleanup(&pool, &credit).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL (integration test)
    async fn test_balance_accumulates_across_payments() {
        let pool = setup_test_db().await;
        let ledger = PgRewardLedger::new(pool.clone());
        let first = seed_credit(&pool, 6).await;

        // Second payment for the same user
        let mut second = seed_credit(&pool, 13).await;
        sqlx::query("UPDATE payments SET user_id = $1 WHERE reference = $2")
            .bind(&first.user_id)
            .bind(&second.payment_reference)
            .execute(&pool)
            .await
            .unwrap();
        second.user_id = first.user_id.clone();

        ledger.credit(&first).await.unwrap();
        let outcome = ledger.credit(&second).await.unwrap();
        assert_eq!(outcome, CreditOutcome::Credited { balance: 19 });

        let history = ledger.history_for(&first.user_id).await.unwrap();
        assert_eq!(history.len(), 2);

        cleanup(&pool, &first).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires DATABASE_URL (integration test)
    async fn test_concurrent_credits_apply_once() {
        let pool = setup_test_db().await;
        let ledger = PgRewardLedger::new(pool.clone());
        let credit = seed_credit(&pool, 6).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let credit = credit.clone();
            handles.push(tokio::spawn(async move { ledger.credit(&credit).await }));
        }

        let mut credited = 0;
        for handle in handles {
            if let CreditOutcome::Credited { .. } = handle.await.unwrap().unwrap() {
                credited += 1;
            }
        }
        assert_eq!(credited, 1);
        assert_eq!(
            ledger.balance(&credit.user_id).await.unwrap().unwrap().points,
            6
        );

        cleanup(&pool, &credit).await;
    }
}

//! In-memory storage backend
//!
//! Implements every storage trait over a single async mutex, so each operation's
//! check-and-set is atomic. Used for local runs (`STORAGE_BACKEND=memory`) and
//! tests. Nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use shared::models::{
    NewPayment, PaymentRecord, PointsRecord, StatusTransition, UserPoints, WebhookLogEntry,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::rewards::PAYMENT_ORIGIN;
use super::{
    CreditOutcome, PaymentStore, PointsCredit, RewardLedger, StoreError, TransitionResult,
    WebhookAudit,
};

/// Audit entries kept in memory; older entries are dropped first
pub const MAX_WEBHOOK_LOGS: usize = 10_000;

#[derive(Default)]
struct MemoryState {
    payments: HashMap<String, PaymentRecord>,
    points_records: Vec<PointsRecord>,
    user_points: HashMap<String, UserPoints>,
    webhook_logs: VecDeque<WebhookLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the most recent [`MAX_WEBHOOK_LOGS`] audit entries, oldest first
    pub async fn webhook_logs(&self) -> Vec<WebhookLogEntry> {
        self.state.lock().await.webhook_logs.iter().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert(&self, payment: NewPayment) -> Result<PaymentRecord, StoreError> {
        let mut state = self.state.lock().await;
        if state.payments.contains_key(&payment.reference) {
            return Err(StoreError::DuplicateReference(payment.reference));
        }

        let record = PaymentRecord::pending(payment, Utc::now());
        state
            .payments
            .insert(record.reference.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, reference: &str) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.state.lock().await.payments.get(reference).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut records: Vec<PaymentRecord> = state
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.reference.cmp(&a.reference))
        });

        Ok(records
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn transition(
        &self,
        reference: &str,
        transition: &StatusTransition,
    ) -> Result<TransitionResult, StoreError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.payments.get_mut(reference) else {
            return Ok(TransitionResult::NotFound);
        };

        if record.status.is_terminal() {
            return Ok(TransitionResult::AlreadyTerminal(record.clone()));
        }

        record.apply_transition(transition);
        Ok(TransitionResult::Applied(record.clone()))
    }

    async fn health(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl RewardLedger for MemoryStore {
    async fn credit(&self, credit: &PointsCredit) -> Result<CreditOutcome, StoreError> {
        let mut state = self.state.lock().await;
        if state
            .points_records
            .iter()
            .any(|r| r.payment_reference == credit.payment_reference)
        {
            return Ok(CreditOutcome::AlreadyCredited);
        }

        let now = Utc::now();
        let id = state.points_records.len() as i64 + 1;
        state.points_records.push(PointsRecord {
            id,
            user_id: credit.user_id.clone(),
            points: credit.points,
            origin: PAYMENT_ORIGIN.to_string(),
            payment_reference: credit.payment_reference.clone(),
            description: credit.description.clone(),
            created_at: now,
        });

        let balance = state
            .user_points
            .entry(credit.user_id.clone())
            .or_insert_with(|| UserPoints {
                user_id: credit.user_id.clone(),
                points: 0,
                total_points_earned: 0,
                updated_at: now,
            });
        balance.points += credit.points;
        balance.total_points_earned += credit.points;
        balance.updated_at = now;

        Ok(CreditOutcome::Credited {
            balance: balance.points,
        })
    }

    async fn balance(&self, user_id: &str) -> Result<Option<UserPoints>, StoreError> {
        Ok(self.state.lock().await.user_points.get(user_id).cloned())
    }

    async fn history_for(&self, user_id: &str) -> Result<Vec<PointsRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .points_records
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WebhookAudit for MemoryStore {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.webhook_logs.len() >= MAX_WEBHOOK_LOGS {
            state.webhook_logs.pop_front();
        }
        state.webhook_logs.push_back(entry.clone());
        Ok(())
    }
}

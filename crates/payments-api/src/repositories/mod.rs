//! Repository layer for payment storage
//!
//! The state machine and payment service depend on the traits below, never on a
//! concrete backend. Two backends exist: PostgreSQL (production) and an
//! in-memory store selected with `STORAGE_BACKEND=memory`.
//!
//! Every backend must make [`PaymentStore::transition`] a compare-and-swap on
//! `status = 'pending'` and [`RewardLedger::credit`] atomic and unique per
//! payment reference. Exactly-once side effects rest on those two guarantees.

use async_trait::async_trait;
use shared::models::{
    NewPayment, PaymentRecord, PointsRecord, StatusTransition, UserPoints, WebhookLogEntry,
};
use thiserror::Error;

pub mod memory;
pub mod notifications;
pub mod payments;
pub mod rewards;
pub mod webhook_logs;

pub use memory::MemoryStore;
pub use notifications::{DeviceRepository, NotificationRepository};
pub use payments::PgPaymentStore;
pub use rewards::PgRewardLedger;
pub use webhook_logs::PgWebhookAudit;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Payment reference already exists: {0}")]
    DuplicateReference(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Outcome of a conditional `pending -> terminal` write
#[derive(Debug, Clone)]
pub enum TransitionResult {
    /// This call performed the transition
    Applied(PaymentRecord),
    /// The record was already terminal (possibly moved by a concurrent caller)
    AlreadyTerminal(PaymentRecord),
    NotFound,
}

/// Payment record storage
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persist a new `pending` payment; fails with `DuplicateReference` on collision
    async fn insert(&self, payment: NewPayment) -> Result<PaymentRecord, StoreError>;

    async fn find(&self, reference: &str) -> Result<Option<PaymentRecord>, StoreError>;

    /// Payments for a user, newest first
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PaymentRecord>, StoreError>;

    /// Move a payment out of `pending`, only if it is still `pending`
    async fn transition(
        &self,
        reference: &str,
        transition: &StatusTransition,
    ) -> Result<TransitionResult, StoreError>;

    /// Backend liveness check
    async fn health(&self) -> Result<(), StoreError>;
}

/// A reward credit for one completed payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsCredit {
    pub user_id: String,
    /// Must be positive
    pub points: i64,
    pub payment_reference: String,
    pub description: Option<String>,
}

/// Outcome of [`RewardLedger::credit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Points added; `balance` is the user's new running balance
    Credited { balance: i64 },
    /// A history entry for this payment reference already exists
    AlreadyCredited,
}

/// Reward point ledger
#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Record the history entry and increment balance plus lifetime total as one
    /// atomic unit, at most once per payment reference
    async fn credit(&self, credit: &PointsCredit) -> Result<CreditOutcome, StoreError>;

    async fn balance(&self, user_id: &str) -> Result<Option<UserPoints>, StoreError>;

    /// Point history for a user, newest first
    async fn history_for(&self, user_id: &str) -> Result<Vec<PointsRecord>, StoreError>;
}

/// Webhook audit trail
#[async_trait]
pub trait WebhookAudit: Send + Sync {
    async fn record(&self, entry: &WebhookLogEntry) -> Result<(), StoreError>;
}

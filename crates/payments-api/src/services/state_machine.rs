//! Payment State Machine
//!
//! Applies validated gateway events to payment records:
//!
//! ```text
//! pending ──payment.success──▶ completed
//!    │────payment.failed───▶ failed
//!    │────payment.cancelled▶ cancelled
//!    └────payment.expired──▶ expired
//! ```
//!
//! Terminal states are absorbing. The gateway delivers at least once, so the
//! same event may arrive many times and concurrently; the conditional write in
//! [`PaymentStore::transition`] lets exactly one delivery perform the transition
//! and its side effects. Side effects:
//!
//! - reward credit (on `completed` only, idempotent per reference)
//! - replica mirror (best-effort)
//! - push notification (best-effort)

use chrono::{DateTime, Utc};
use metrics::counter;
use shared::models::{PaymentRecord, PaymentStatus, StatusTransition, WebhookEventKind};
use std::sync::Arc;
use thiserror::Error;

use crate::repositories::{
    CreditOutcome, PaymentStore, PointsCredit, RewardLedger, StoreError, TransitionResult,
};
use crate::services::notifier::{Notification, Notifier};
use crate::services::payload::WebhookEvent;
use crate::services::replica::{best_effort, PaymentReplica};

/// Stored when a failure event carries no message
pub const DEFAULT_FAILED_MESSAGE: &str = "Payment failed";

/// Stored when an expiry event carries no message
pub const DEFAULT_EXPIRED_MESSAGE: &str = "Payment expired";

/// Errors from applying an event
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Result of applying an event
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// This delivery moved the payment out of `pending`
    Transitioned {
        payment: PaymentRecord,
        credit: Option<CreditOutcome>,
    },
    /// The payment was already terminal; nothing changed except, for a repeated
    /// `payment.success`, a repaired reward credit
    Duplicate {
        payment: PaymentRecord,
        credit: Option<CreditOutcome>,
    },
    /// Recognized event with no transition (`payment.pending`)
    Unhandled { event: WebhookEventKind },
}

/// Outcome of a user-initiated cancellation
#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Cancelled(PaymentRecord),
    AlreadyFinal(PaymentRecord),
}

pub struct PaymentStateMachine {
    payments: Arc<dyn PaymentStore>,
    ledger: Arc<dyn RewardLedger>,
    notifier: Arc<dyn Notifier>,
    replica: Arc<dyn PaymentReplica>,
}

impl PaymentStateMachine {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        ledger: Arc<dyn RewardLedger>,
        notifier: Arc<dyn Notifier>,
        replica: Arc<dyn PaymentReplica>,
    ) -> Self {
        Self {
            payments,
            ledger,
            notifier,
            replica,
        }
    }

    /// Apply a validated event
    ///
    /// # Errors
    ///
    /// `PaymentNotFound` for an unknown reference; `Storage` when the primary
    /// store or ledger fails (the gateway should redeliver).
    pub async fn apply(
        &self,
        event: &WebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome, ApplyError> {
        let Some(target) = event.kind.target_status() else {
            tracing::info!(
                reference = %event.reference,
                event = %event.kind,
                "Event acknowledged without transition"
            );
            return Ok(ApplyOutcome::Unhandled { event: event.kind });
        };

        let current = self
            .payments
            .find(&event.reference)
            .await?
            .ok_or_else(|| ApplyError::PaymentNotFound(event.reference.clone()))?;

        if current.status.is_terminal() {
            return self.duplicate(event.kind, current).await;
        }

        let transition = StatusTransition {
            to: target,
            gateway_payment_id: event.gateway_payment_id.clone(),
            transaction_id: event.transaction_id.clone(),
            error_message: error_message_for(target, event.error_message.as_deref()),
            raw_event_payload: Some(event.raw.clone()),
            at: now,
        };

        let payment = match self.payments.transition(&event.reference, &transition).await? {
            TransitionResult::Applied(payment) => payment,
            // Lost the race against a concurrent delivery
            TransitionResult::AlreadyTerminal(payment) => {
                return self.duplicate(event.kind, payment).await
            }
            TransitionResult::NotFound => {
                return Err(ApplyError::PaymentNotFound(event.reference.clone()))
            }
        };

        tracing::info!(
            reference = %payment.reference,
            event = %event.kind,
            status = %payment.status,
            "Payment transitioned"
        );

        best_effort(
            "update_status",
            &payment.reference,
            self.replica.update_status(&payment).await,
        );

        let credit = if payment.status == PaymentStatus::Completed {
            self.credit_points(&payment).await
        } else {
            Ok(None)
        };

        // The payer is told about the new status even when the credit has to
        // wait for a redelivery; the duplicate path does not notify again
        self.notify(&payment).await;
        let credit = credit?;

        Ok(ApplyOutcome::Transitioned { payment, credit })
    }

    /// Cancel a pending payment on the payer's request
    ///
    /// Uses the same conditional write as gateway events, so a cancellation
    /// racing a `payment.success` has exactly one winner.
    pub async fn cancel(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome, ApplyError> {
        let transition = StatusTransition::new(PaymentStatus::Cancelled, now);

        match self.payments.transition(reference, &transition).await? {
            TransitionResult::Applied(payment) => {
                tracing::info!(reference = %reference, "Payment cancelled by user");
                best_effort(
                    "update_status",
                    reference,
                    self.replica.update_status(&payment).await,
                );
                Ok(CancelOutcome::Cancelled(payment))
            }
            TransitionResult::AlreadyTerminal(payment) => Ok(CancelOutcome::AlreadyFinal(payment)),
            TransitionResult::NotFound => Err(ApplyError::PaymentNotFound(reference.to_string())),
        }
    }

    async fn duplicate(
        &self,
        kind: WebhookEventKind,
        payment: PaymentRecord,
    ) -> Result<ApplyOutcome, ApplyError> {
        tracing::info!(
            reference = %payment.reference,
            event = %kind,
            status = %payment.status,
            "Payment already final, event ignored"
        );

        // A crash between the transition and the credit is repaired by the
        // gateway's redelivery; the ledger guarantees no double credit
        let credit =
            if kind == WebhookEventKind::Success && payment.status == PaymentStatus::Completed {
                self.credit_points(&payment).await?
            } else {
                None
            };

        Ok(ApplyOutcome::Duplicate { payment, credit })
    }

    async fn credit_points(
        &self,
        payment: &PaymentRecord,
    ) -> Result<Option<CreditOutcome>, ApplyError> {
        if payment.points_earned <= 0 {
            return Ok(None);
        }

        let credit = PointsCredit {
            user_id: payment.user_id.clone(),
            points: payment.points_earned,
            payment_reference: payment.reference.clone(),
            description: Some(format!("Points earned for payment {}", payment.reference)),
        };

        let outcome = self.ledger.credit(&credit).await?;
        match outcome {
            CreditOutcome::Credited { balance } => {
                tracing::info!(
                    reference = %payment.reference,
                    user_id = %payment.user_id,
                    points = payment.points_earned,
                    balance = balance,
                    "Reward points credited"
                );
                counter!("payments_points_credited_total").increment(payment.points_earned as u64);
                best_effort(
                    "record_points",
                    &payment.reference,
                    self.replica.record_points(&credit).await,
                );
            }
            CreditOutcome::AlreadyCredited => {
                tracing::debug!(reference = %payment.reference, "Reward points already credited");
            }
        }

        Ok(Some(outcome))
    }

    async fn notify(&self, payment: &PaymentRecord) {
        let Some(notification) = Notification::for_payment(payment) else {
            return;
        };
        if !self.notifier.notify(&payment.user_id, &notification).await {
            tracing::debug!(
                reference = %payment.reference,
                user_id = %payment.user_id,
                "Payment notification not delivered"
            );
        }
    }
}

/// Error message stored with a transition (only `failed` and `expired` keep one)
fn error_message_for(target: PaymentStatus, received: Option<&str>) -> Option<String> {
    match target {
        PaymentStatus::Failed => Some(received.unwrap_or(DEFAULT_FAILED_MESSAGE).to_string()),
        PaymentStatus::Expired => Some(received.unwrap_or(DEFAULT_EXPIRED_MESSAGE).to_string()),
        PaymentStatus::Pending | PaymentStatus::Completed | PaymentStatus::Cancelled => None,
    }
}

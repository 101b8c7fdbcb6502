//! Webhook acknowledgement bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::ApplyOutcome;

/// Body returned to the gateway when a delivery is accepted
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    pub message: String,
    /// `transitioned`, `duplicate` or `unhandled`
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl WebhookAck {
    pub fn from_outcome(outcome: &ApplyOutcome, processed_at: DateTime<Utc>) -> Self {
        let (result, message, reference) = match outcome {
            ApplyOutcome::Transitioned { payment, .. } => (
                "transitioned",
                format!("Payment {} is now {}", payment.reference, payment.status),
                Some(payment.reference.clone()),
            ),
            ApplyOutcome::Duplicate { payment, .. } => (
                "duplicate",
                format!("Payment {} was already {}", payment.reference, payment.status),
                Some(payment.reference.clone()),
            ),
            ApplyOutcome::Unhandled { event } => {
                ("unhandled", format!("Event {} acknowledged", event), None)
            }
        };

        Self {
            status: "success".to_string(),
            message,
            result: result.to_string(),
            reference,
            processed_at,
        }
    }
}

/// Webhook endpoint health
#[derive(Debug, Serialize)]
pub struct WebhookHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub signature_configured: bool,
    pub timestamp: DateTime<Utc>,
}

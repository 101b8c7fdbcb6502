//! Payment DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::models::{Amount, Operator, PaymentRecord, PaymentStatus};
use validator::Validate;

use crate::services::CreatedPayment;
use crate::validators::{validate_phone, validate_reference};

/// Request to originate a payment
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub amount: Amount,

    #[validate(custom(function = "validate_phone"))]
    pub phone_number: String,

    /// One of the supported carriers; detected from the phone prefix when absent
    pub operator: Option<String>,

    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,

    #[validate(custom(function = "validate_reference"))]
    pub reference: Option<String>,

    #[validate(length(max = 255))]
    pub description: Option<String>,

    pub metadata: Option<Value>,
}

impl CreatePaymentRequest {
    /// Parse the optional operator; `Err` carries the rejected value
    pub fn operator(&self) -> Result<Option<Operator>, String> {
        match self.operator.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| raw.to_string()),
        }
    }
}

/// Payload of a successful origination
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub reference: String,
    pub payment_url: String,
    pub points_earned: i64,
    pub operator: Operator,
}

impl From<CreatedPayment> for CreatePaymentResponse {
    fn from(created: CreatedPayment) -> Self {
        Self {
            reference: created.reference,
            payment_url: created.payment_url,
            points_earned: created.points_earned,
            operator: created.operator,
        }
    }
}

/// Status view of one payment
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub reference: String,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub currency: String,
    pub operator: Operator,
    pub points_earned: i64,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<PaymentRecord> for PaymentStatusResponse {
    fn from(p: PaymentRecord) -> Self {
        Self {
            reference: p.reference,
            status: p.status,
            amount: p.amount,
            currency: p.currency,
            operator: p.operator,
            points_earned: p.points_earned,
            created_at: p.created_at,
            confirmed_at: p.confirmed_at,
            cancelled_at: p.cancelled_at,
            error_message: p.error_message,
        }
    }
}

/// Listing entry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub reference: String,
    pub status: PaymentStatus,
    pub amount: Amount,
    pub currency: String,
    pub operator: Operator,
    pub phone_number: String,
    pub points_earned: i64,
    pub description: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for PaymentSummary {
    fn from(p: PaymentRecord) -> Self {
        Self {
            reference: p.reference,
            status: p.status,
            amount: p.amount,
            currency: p.currency,
            operator: p.operator,
            phone_number: p.phone_number,
            points_earned: p.points_earned,
            description: p.description,
            transaction_id: p.transaction_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
            confirmed_at: p.confirmed_at,
            cancelled_at: p.cancelled_at,
        }
    }
}

/// Payload of a successful cancellation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPaymentResponse {
    pub reference: String,
    pub status: PaymentStatus,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for CancelPaymentResponse {
    fn from(p: PaymentRecord) -> Self {
        Self {
            reference: p.reference,
            status: p.status,
            cancelled_at: p.cancelled_at,
        }
    }
}

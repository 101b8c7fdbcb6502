//! Webhook Payload Validation
//!
//! Structural checks on an authenticated webhook body, producing a typed
//! [`WebhookEvent`]. Business rules (does the reference exist, is the amount
//! right) belong to the state machine, not here.

use serde_json::{Map, Value};
use shared::models::{Amount, WebhookEventKind};
use thiserror::Error;

/// Payload validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("Payload is not a JSON object: {0}")]
    Malformed(String),

    #[error("Event not specified in payload")]
    MissingEvent,

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Data not specified in payload")]
    MissingData,

    #[error("Reference not found in payload data")]
    MissingReference,

    #[error("Missing required field for {event}: {field}")]
    MissingField {
        event: WebhookEventKind,
        field: &'static str,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl PayloadError {
    pub fn code(&self) -> &'static str {
        match self {
            PayloadError::Malformed(_) => "MALFORMED_PAYLOAD",
            PayloadError::MissingEvent => "MISSING_EVENT",
            PayloadError::UnknownEvent(_) => "UNKNOWN_EVENT",
            PayloadError::MissingData => "MISSING_DATA",
            PayloadError::MissingReference => "MISSING_REFERENCE",
            PayloadError::MissingField { .. } => "MISSING_FIELD",
            PayloadError::InvalidAmount(_) => "INVALID_AMOUNT",
        }
    }
}

/// A validated gateway event
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookEventKind,
    pub reference: String,
    /// Gateway-side payment id (`data.id`)
    pub gateway_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub amount: Option<Amount>,
    pub error_message: Option<String>,
    /// The full parsed body, stored with the payment for audit
    pub raw: Value,
}

/// Parse and validate a raw webhook body
pub fn parse(body: &[u8]) -> Result<WebhookEvent, PayloadError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
    validate(value)
}

/// Validate an already-parsed webhook body
pub fn validate(raw: Value) -> Result<WebhookEvent, PayloadError> {
    let root = raw
        .as_object()
        .ok_or_else(|| PayloadError::Malformed("expected a JSON object".to_string()))?;

    let event = root
        .get("event")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or(PayloadError::MissingEvent)?;
    let kind: WebhookEventKind = event
        .parse()
        .map_err(|_| PayloadError::UnknownEvent(event.to_string()))?;

    let data = root
        .get("data")
        .and_then(Value::as_object)
        .ok_or(PayloadError::MissingData)?;

    let reference = text_field(data, "reference").ok_or(PayloadError::MissingReference)?;
    let transaction_id = text_field(data, "transaction_id");
    let amount = match data.get("amount") {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_amount(value)?),
    };

    if kind == WebhookEventKind::Success {
        if amount.is_none() {
            return Err(PayloadError::MissingField {
                event: kind,
                field: "amount",
            });
        }
        if transaction_id.is_none() {
            return Err(PayloadError::MissingField {
                event: kind,
                field: "transaction_id",
            });
        }
    }

    Ok(WebhookEvent {
        kind,
        reference,
        gateway_payment_id: text_field(data, "id"),
        transaction_id,
        amount,
        error_message: text_field(data, "error_message"),
        raw,
    })
}

/// Non-empty string, or a number rendered as text (gateway ids are sometimes numeric)
fn text_field(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_amount(value: &Value) -> Result<Amount, PayloadError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| PayloadError::InvalidAmount(n.to_string()))
            .and_then(|v| {
                Amount::from_major(v).map_err(|e| PayloadError::InvalidAmount(e.to_string()))
            }),
        Value::String(s) => s
            .parse()
            .map_err(|e: shared::models::AmountError| PayloadError::InvalidAmount(e.to_string())),
        other => Err(PayloadError::InvalidAmount(other.to_string())),
    }
}

//! Data models matching the PostgreSQL database schema
//!
//! Status and event names are a wire contract with the payment gateway and are
//! persisted verbatim; they are modelled as closed enums so that every match over
//! them is checked by the compiler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a persisted or received literal is not part of a closed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

// ============================================================================
// Amount
// ============================================================================

/// Errors produced when converting a decimal into an [`Amount`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AmountError {
    #[error("amount is not a finite number")]
    NotFinite,

    #[error("amount must not be negative")]
    Negative,

    #[error("amount is too large")]
    Overflow,

    #[error("amount is not a valid decimal: {0}")]
    Unparsable(String),
}

/// Monetary amount in minor units (centavos for MZN)
///
/// Wire formats carry decimals (`5.0`, `"5.00"`); internally the value is an
/// integer so tier comparisons and bound checks are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    /// Minor units per major unit
    pub const MINOR_PER_MAJOR: i64 = 100;

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Convert a decimal major-unit value, rounding to the nearest minor unit
    pub fn from_major(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::NotFinite);
        }
        if value < 0.0 {
            return Err(AmountError::Negative);
        }
        let minor = (value * Self::MINOR_PER_MAJOR as f64).round();
        if minor > i64::MAX as f64 {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor as i64))
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn to_major(self) -> f64 {
        self.0 as f64 / Self::MINOR_PER_MAJOR as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / Self::MINOR_PER_MAJOR,
            (self.0 % Self::MINOR_PER_MAJOR).abs()
        )
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| AmountError::Unparsable(trimmed.to_string()))?;
        Self::from_major(value)
    }
}

impl From<i64> for Amount {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Amount::from_major(n).map_err(serde::de::Error::custom),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// Payment status
// ============================================================================

/// Payment lifecycle status
///
/// `Pending` is the only non-terminal state; every other state is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Webhook event kind
// ============================================================================

/// Event names emitted by the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEventKind {
    #[serde(rename = "payment.success")]
    Success,
    #[serde(rename = "payment.failed")]
    Failed,
    #[serde(rename = "payment.cancelled")]
    Cancelled,
    #[serde(rename = "payment.expired")]
    Expired,
    #[serde(rename = "payment.pending")]
    Pending,
}

impl WebhookEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::Success => "payment.success",
            WebhookEventKind::Failed => "payment.failed",
            WebhookEventKind::Cancelled => "payment.cancelled",
            WebhookEventKind::Expired => "payment.expired",
            WebhookEventKind::Pending => "payment.pending",
        }
    }

    /// Status a pending payment moves to when this event is applied.
    ///
    /// `payment.pending` is recognized but drives no transition.
    pub const fn target_status(&self) -> Option<PaymentStatus> {
        match self {
            WebhookEventKind::Success => Some(PaymentStatus::Completed),
            WebhookEventKind::Failed => Some(PaymentStatus::Failed),
            WebhookEventKind::Cancelled => Some(PaymentStatus::Cancelled),
            WebhookEventKind::Expired => Some(PaymentStatus::Expired),
            WebhookEventKind::Pending => None,
        }
    }
}

impl fmt::Display for WebhookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment.success" => Ok(WebhookEventKind::Success),
            "payment.failed" => Ok(WebhookEventKind::Failed),
            "payment.cancelled" => Ok(WebhookEventKind::Cancelled),
            "payment.expired" => Ok(WebhookEventKind::Expired),
            "payment.pending" => Ok(WebhookEventKind::Pending),
            other => Err(UnknownVariant::new("webhook event", other)),
        }
    }
}

// ============================================================================
// Operator
// ============================================================================

/// Supported mobile-money carriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Mcel,
    Vodacom,
    Movitel,
    Tmcel,
    Mpesa,
    Emola,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Mcel,
        Operator::Vodacom,
        Operator::Movitel,
        Operator::Tmcel,
        Operator::Mpesa,
        Operator::Emola,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Operator::Mcel => "mcel",
            Operator::Vodacom => "vodacom",
            Operator::Movitel => "movitel",
            Operator::Tmcel => "tmcel",
            Operator::Mpesa => "mpesa",
            Operator::Emola => "emola",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = UnknownVariant;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == lowered)
            .ok_or_else(|| UnknownVariant::new("operator", s))
    }
}

impl TryFrom<String> for Operator {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Payment record (`payments` table)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentRecord {
    pub reference: String,
    pub user_id: String,
    #[sqlx(try_from = "i64", rename = "amount_minor")]
    pub amount: Amount,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub operator: Operator,
    pub phone_number: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub points_earned: i64,
    pub description: Option<String>,
    /// Gateway-side payment id (`data.id`)
    pub gateway_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub raw_event_payload: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Build the initial `pending` record for a new payment
    pub fn pending(new: NewPayment, now: DateTime<Utc>) -> Self {
        Self {
            reference: new.reference,
            user_id: new.user_id,
            amount: new.amount,
            currency: new.currency,
            operator: new.operator,
            phone_number: new.phone_number,
            status: PaymentStatus::Pending,
            points_earned: new.points_earned,
            description: new.description,
            gateway_payment_id: None,
            transaction_id: None,
            error_message: None,
            raw_event_payload: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            failed_at: None,
            cancelled_at: None,
            expired_at: None,
        }
    }

    /// Apply a terminal transition in place (used by non-SQL backends)
    pub fn apply_transition(&mut self, transition: &StatusTransition) {
        self.status = transition.to;
        self.updated_at = transition.at;
        if transition.transaction_id.is_some() {
            self.transaction_id = transition.transaction_id.clone();
        }
        if transition.gateway_payment_id.is_some() {
            self.gateway_payment_id = transition.gateway_payment_id.clone();
        }
        self.error_message = transition.error_message.clone();
        if transition.raw_event_payload.is_some() {
            self.raw_event_payload = transition.raw_event_payload.clone();
        }
        match transition.to {
            PaymentStatus::Completed => self.confirmed_at = Some(transition.at),
            PaymentStatus::Failed => self.failed_at = Some(transition.at),
            PaymentStatus::Cancelled => self.cancelled_at = Some(transition.at),
            PaymentStatus::Expired => self.expired_at = Some(transition.at),
            PaymentStatus::Pending => {}
        }
    }

    /// Timestamp of the terminal transition, if any
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            PaymentStatus::Pending => None,
            PaymentStatus::Completed => self.confirmed_at,
            PaymentStatus::Failed => self.failed_at,
            PaymentStatus::Cancelled => self.cancelled_at,
            PaymentStatus::Expired => self.expired_at,
        }
    }
}

/// Data needed to persist a new payment
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub reference: String,
    pub user_id: String,
    pub amount: Amount,
    pub currency: String,
    pub operator: Operator,
    pub phone_number: String,
    pub points_earned: i64,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
}

/// A conditional `pending -> to` transition with its outcome metadata
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub to: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Only meaningful for `failed` and `expired`; cleared otherwise
    pub error_message: Option<String>,
    pub raw_event_payload: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl StatusTransition {
    pub fn new(to: PaymentStatus, at: DateTime<Utc>) -> Self {
        Self {
            to,
            gateway_payment_id: None,
            transaction_id: None,
            error_message: None,
            raw_event_payload: None,
            at,
        }
    }
}

// ============================================================================
// Rewards
// ============================================================================

/// Point history entry (`points_records` table), unique per payment reference
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointsRecord {
    pub id: i64,
    pub user_id: String,
    pub points: i64,
    pub origin: String,
    pub payment_reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Running point balance for a user (`user_points` table)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPoints {
    pub user_id: String,
    pub points: i64,
    pub total_points_earned: i64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Webhook audit log
// ============================================================================

/// Kind of webhook audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookLogKind {
    /// Signature or payload check failed
    Rejected,
    Received,
    Processed,
    Failed,
    Unhandled,
}

impl WebhookLogKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WebhookLogKind::Rejected => "rejected",
            WebhookLogKind::Received => "received",
            WebhookLogKind::Processed => "processed",
            WebhookLogKind::Failed => "failed",
            WebhookLogKind::Unhandled => "unhandled",
        }
    }
}

/// Webhook audit entry (`webhook_logs` table)
#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogEntry {
    pub kind: WebhookLogKind,
    pub event: Option<String>,
    pub reference: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub source_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookLogEntry {
    pub fn new(kind: WebhookLogKind, created_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            event: None,
            reference: None,
            payload: None,
            error: None,
            source_ip: None,
            created_at,
        }
    }
}

// ============================================================================
// Notification log
// ============================================================================

/// Delivery outcome of a push notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Delivered,
    Failed,
}

impl NotificationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
        }
    }
}

/// Notification delivery record (`notifications` table)
#[derive(Debug, Clone, Serialize)]
pub struct NotificationLogEntry {
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub notification_type: String,
    pub reference: Option<String>,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

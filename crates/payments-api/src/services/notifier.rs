//! Payment Notification Dispatcher
//!
//! Tells the payer about a terminal transition through a push notification.
//! Delivery is best-effort: [`Notifier::notify`] reports success as a `bool` and
//! never returns an error, so a push outage can never fail a payment operation.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use shared::config::NotificationConfig;
use shared::models::{
    NotificationLogEntry, NotificationStatus, PaymentRecord, PaymentStatus,
};
use shared::DbPool;
use std::time::Duration;

use crate::repositories::{DeviceRepository, NotificationRepository};

/// Timeout for a single push request
const PUSH_TIMEOUT_SECS: u64 = 10;

/// Notification category, sent to the app as `data.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PaymentSuccess,
    PaymentFailed,
    PaymentCancelled,
    PaymentExpired,
}

impl NotificationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PaymentSuccess => "payment_success",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::PaymentCancelled => "payment_cancelled",
            NotificationKind::PaymentExpired => "payment_expired",
        }
    }
}

/// A user-facing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub reference: String,
}

impl Notification {
    /// Message for a payment that just reached a terminal status
    ///
    /// Returns `None` for `pending`, which is never announced.
    pub fn for_payment(payment: &PaymentRecord) -> Option<Self> {
        let (kind, title, body) = match payment.status {
            PaymentStatus::Pending => return None,
            PaymentStatus::Completed => (
                NotificationKind::PaymentSuccess,
                "Payment confirmed".to_string(),
                if payment.points_earned > 0 {
                    format!(
                        "Your payment of {} MT was confirmed. You earned {} points!",
                        payment.amount, payment.points_earned
                    )
                } else {
                    format!("Your payment of {} MT was confirmed.", payment.amount)
                },
            ),
            PaymentStatus::Failed => (
                NotificationKind::PaymentFailed,
                "Payment failed".to_string(),
                "Your payment could not be processed. Please try again.".to_string(),
            ),
            PaymentStatus::Cancelled => (
                NotificationKind::PaymentCancelled,
                "Payment cancelled".to_string(),
                "Your payment was cancelled.".to_string(),
            ),
            PaymentStatus::Expired => (
                NotificationKind::PaymentExpired,
                "Payment expired".to_string(),
                "Your payment request expired. Please start a new payment.".to_string(),
            ),
        };

        Some(Self {
            title,
            body,
            kind,
            reference: payment.reference.clone(),
        })
    }
}

/// Push notification dispatcher
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a notification; `true` when it was delivered
    async fn notify(&self, user_id: &str, notification: &Notification) -> bool;
}

/// Dispatcher used when no push provider is configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> bool {
        tracing::info!(
            user_id = %user_id,
            reference = %notification.reference,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "Push notifications not configured, notification logged only"
        );
        counter!("payments_notifications_total", "status" => "skipped").increment(1);
        false
    }
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    failure: u32,
}

/// Firebase Cloud Messaging dispatcher (legacy HTTP API)
///
/// Looks up the user's device token in `user_devices` and records every attempt
/// in `notifications`.
#[derive(Clone)]
pub struct FcmNotifier {
    client: Client,
    pool: DbPool,
    server_key: String,
    endpoint: String,
}

impl FcmNotifier {
    /// Returns `None` when no FCM server key is configured
    pub fn from_config(config: &NotificationConfig, pool: DbPool) -> Option<Self> {
        let server_key = config.fcm_server_key.clone()?;
        let client = match Client::builder()
            .timeout(Duration::from_secs(PUSH_TIMEOUT_SECS))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create FCM HTTP client");
                return None;
            }
        };

        Some(Self {
            client,
            pool,
            server_key,
            endpoint: config.fcm_endpoint.clone(),
        })
    }

    async fn send(&self, token: &str, notification: &Notification) -> Result<(), String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("key={}", self.server_key))
            .json(&json!({
                "to": token,
                "notification": {
                    "title": notification.title,
                    "body": notification.body,
                },
                "data": {
                    "type": notification.kind.as_str(),
                    "reference": notification.reference,
                },
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("FCM returned HTTP {}", status.as_u16()));
        }

        let body: FcmResponse = response.json().await.map_err(|e| e.to_string())?;
        if body.failure > 0 {
            return Err("FCM rejected the device token".to_string());
        }
        Ok(())
    }

    async fn record(&self, user_id: &str, notification: &Notification, error: Option<String>) {
        let entry = NotificationLogEntry {
            user_id: user_id.to_string(),
            title: notification.title.clone(),
            body: notification.body.clone(),
            notification_type: notification.kind.as_str().to_string(),
            reference: Some(notification.reference.clone()),
            status: if error.is_none() {
                NotificationStatus::Delivered
            } else {
                NotificationStatus::Failed
            },
            error,
            sent_at: Utc::now(),
        };

        if let Err(e) = NotificationRepository::record(&self.pool, &entry).await {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to record notification");
        }
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn notify(&self, user_id: &str, notification: &Notification) -> bool {
        let token = match DeviceRepository::find_token(&self.pool, user_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(user_id = %user_id, "No device token registered");
                counter!("payments_notifications_total", "status" => "skipped").increment(1);
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Failed to look up device token");
                counter!("payments_notifications_total", "status" => "failed").increment(1);
                return false;
            }
        };

        match self.send(&token, notification).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %user_id,
                    reference = %notification.reference,
                    kind = notification.kind.as_str(),
                    "Push notification delivered"
                );
                counter!("payments_notifications_total", "status" => "delivered").increment(1);
                self.record(user_id, notification, None).await;
                true
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    reference = %notification.reference,
                    error = %e,
                    "Push notification failed"
                );
                counter!("payments_notifications_total", "status" => "failed").increment(1);
                self.record(user_id, notification, Some(e)).await;
                false
            }
        }
    }
}

//! Secondary Payment Replica
//!
//! Mirrors payments and reward points into a Parse Server (Back4App) app that
//! older clients still read from. The primary store is authoritative: replica
//! writes happen after the primary write, and their failures are logged and
//! counted through [`best_effort`] but never propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use shared::config::ReplicaConfig;
use shared::models::{PaymentRecord, PaymentStatus};
use std::time::Duration;
use thiserror::Error;

use crate::repositories::PointsCredit;

/// Timeout for a single replica request
const REPLICA_TIMEOUT_SECS: u64 = 10;

/// Replica errors
#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error("Replica request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Replica returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{class} not found in replica: {key}")]
    NotFound { class: &'static str, key: String },
}

/// Best-effort mirror of the primary store
#[async_trait]
pub trait PaymentReplica: Send + Sync {
    async fn save_payment(&self, payment: &PaymentRecord) -> Result<(), ReplicaError>;

    /// Copy the payment's current status and outcome metadata
    async fn update_status(&self, payment: &PaymentRecord) -> Result<(), ReplicaError>;

    /// Add a point history entry and increment the user's counters
    async fn record_points(&self, credit: &PointsCredit) -> Result<(), ReplicaError>;
}

/// Log and count a failed replica write; the primary outcome stands
pub fn best_effort(operation: &'static str, reference: &str, result: Result<(), ReplicaError>) {
    if let Err(e) = result {
        tracing::warn!(
            operation = operation,
            reference = %reference,
            error = %e,
            "Replica write failed (primary store unaffected)"
        );
        counter!("payments_replica_errors_total", "operation" => operation).increment(1);
    }
}

/// Replica used when none is configured
#[derive(Debug, Default, Clone)]
pub struct NoReplica;

#[async_trait]
impl PaymentReplica for NoReplica {
    async fn save_payment(&self, _payment: &PaymentRecord) -> Result<(), ReplicaError> {
        Ok(())
    }

    async fn update_status(&self, _payment: &PaymentRecord) -> Result<(), ReplicaError> {
        Ok(())
    }

    async fn record_points(&self, _credit: &PointsCredit) -> Result<(), ReplicaError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct QueryResults {
    results: Vec<ObjectRef>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    #[serde(rename = "objectId")]
    object_id: String,
}

/// Parse Server REST API replica
#[derive(Clone)]
pub struct ParseReplica {
    client: Client,
    server_url: String,
    app_id: String,
    rest_api_key: String,
}

impl ParseReplica {
    pub fn new(config: &ReplicaConfig) -> Result<Self, ReplicaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REPLICA_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            rest_api_key: config.rest_api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.server_url, path))
            .header("X-Parse-Application-Id", &self.app_id)
            .header("X-Parse-REST-API-Key", &self.rest_api_key)
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, ReplicaError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ReplicaError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// objectId of the first object of `class` whose `field` equals `value`
    async fn find_object_id(
        &self,
        class: &'static str,
        field: &str,
        value: &str,
    ) -> Result<String, ReplicaError> {
        let mut filter = Map::new();
        filter.insert(field.to_string(), json!(value));
        let filter = Value::Object(filter).to_string();
        let response = Self::send(
            self.request(Method::GET, &format!("/classes/{}", class))
                .query(&[("where", filter.as_str()), ("limit", "1")]),
        )
        .await?;

        let found: QueryResults = response.json().await?;
        found
            .results
            .into_iter()
            .next()
            .map(|o| o.object_id)
            .ok_or_else(|| ReplicaError::NotFound {
                class,
                key: value.to_string(),
            })
    }
}

fn parse_date(at: DateTime<Utc>) -> Value {
    json!({ "__type": "Date", "iso": at.to_rfc3339() })
}

/// Fields copied on a status change
fn status_update(payment: &PaymentRecord) -> Value {
    let mut fields = Map::new();
    fields.insert("status".into(), json!(payment.status.as_str()));
    if let Some(id) = &payment.gateway_payment_id {
        fields.insert("paysuiteId".into(), json!(id));
    }
    if let Some(tx) = &payment.transaction_id {
        fields.insert("transactionId".into(), json!(tx));
    }
    if let Some(message) = &payment.error_message {
        fields.insert("errorMessage".into(), json!(message));
    }
    if let Some(at) = payment.terminal_at() {
        let key = match payment.status {
            PaymentStatus::Completed => "confirmedAt",
            PaymentStatus::Failed => "failedAt",
            PaymentStatus::Cancelled => "cancelledAt",
            PaymentStatus::Expired => "expiredAt",
            PaymentStatus::Pending => "updatedAt",
        };
        fields.insert(key.into(), parse_date(at));
    }
    Value::Object(fields)
}

#[async_trait]
impl PaymentReplica for ParseReplica {
    async fn save_payment(&self, payment: &PaymentRecord) -> Result<(), ReplicaError> {
        Self::send(self.request(Method::POST, "/classes/Payment").json(&json!({
            "reference": payment.reference,
            "amount": payment.amount.to_major(),
            "currency": payment.currency,
            "operator": payment.operator.as_str(),
            "phoneNumber": payment.phone_number,
            "status": payment.status.as_str(),
            "pointsEarned": payment.points_earned,
            "userId": payment.user_id,
            "metadata": payment.metadata,
        })))
        .await?;
        Ok(())
    }

    async fn update_status(&self, payment: &PaymentRecord) -> Result<(), ReplicaError> {
        let object_id = self
            .find_object_id("Payment", "reference", &payment.reference)
            .await?;
        Self::send(
            self.request(Method::PUT, &format!("/classes/Payment/{}", object_id))
                .json(&status_update(payment)),
        )
        .await?;
        Ok(())
    }

    async fn record_points(&self, credit: &PointsCredit) -> Result<(), ReplicaError> {
        Self::send(self.request(Method::POST, "/classes/PointsRecord").json(&json!({
            "userId": credit.user_id,
            "points": credit.points,
            "origin": "payment",
            "paymentReference": credit.payment_reference,
            "description": credit.description.clone().unwrap_or_default(),
        })))
        .await?;

        let object_id = self.find_object_id("User", "uid", &credit.user_id).await?;
        Self::send(
            self.request(Method::PUT, &format!("/classes/User/{}", object_id))
                .json(&json!({
                    "points": { "__op": "Increment", "amount": credit.points },
                    "totalPointsEarned": { "__op": "Increment", "amount": credit.points },
                })),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Amount, NewPayment, Operator, StatusTransition};

    fn payment() -> PaymentRecord {
        PaymentRecord::pending(
            NewPayment {
                reference: "INF1".to_string(),
                user_id: "user-1".to_string(),
                amount: Amount::from_minor(500),
                currency: "MZN".to_string(),
                operator: Operator::Mpesa,
                phone_number: "258841234567".to_string(),
                points_earned: 6,
                description: None,
                metadata: json!({}),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_status_update_for_completed_payment() {
        let mut record = payment();
        let mut transition = StatusTransition::new(PaymentStatus::Completed, Utc::now());
        transition.transaction_id = Some("TX1".to_string());
        transition.gateway_payment_id = Some("991".to_string());
        record.apply_transition(&transition);

        let update = status_update(&record);
        assert_eq!(update["status"], "completed");
        assert_eq!(update["transactionId"], "TX1");
        assert_eq!(update["paysuiteId"], "991");
        assert_eq!(update["confirmedAt"]["__type"], "Date");
        assert!(update.get("errorMessage").is_none());
    }

    #[test]
    fn test_status_update_for_failed_payment() {
        let mut record = payment();
        let mut transition = StatusTransition::new(PaymentStatus::Failed, Utc::now());
        transition.error_message = Some("insufficient funds".to_string());
        record.apply_transition(&transition);

        let update = status_update(&record);
        assert_eq!(update["status"], "failed");
        assert_eq!(update["errorMessage"], "insufficient funds");
        assert!(update.get("failedAt").is_some());
    }

    #[tokio::test]
    async fn test_no_replica_accepts_everything() {
        let replica = NoReplica;
        assert!(replica.save_payment(&payment()).await.is_ok());
        assert!(replica.update_status(&payment()).await.is_ok());
    }

    #[test]
    fn test_best_effort_swallows_errors() {
        best_effort(
            "update_status",
            "INF1",
            Err(ReplicaError::NotFound {
                class: "Payment",
                key: "INF1".to_string(),
            }),
        );
        best_effort("save_payment", "INF1", Ok(()));
    }
}

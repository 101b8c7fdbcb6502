//! Common test utilities for integration tests
//!
//! Builds the payment services over the in-memory backend with a fake gateway,
//! and provides JWT and signed-webhook helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use payments_api::middleware::Claims;
use payments_api::repositories::{MemoryStore, PointsCredit};
use payments_api::services::paysuite::{GatewayPayment, GatewayPaymentRequest};
use payments_api::services::{
    GatewayError, NoReplica, Notification, Notifier, PaymentGateway, PaymentReplica,
    PaymentService, PaymentStateMachine, ReplicaError, SignatureVerifier, WebhookIngress,
};
use serde_json::{json, Value};
use shared::models::PaymentRecord;
use shared::PaymentPolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Test configuration constants
pub const TEST_JWT_SECRET: &str = "test_jwt_secret_for_integration_tests";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_integration_test_secret";
pub const TOLERANCE_SECS: u64 = 300;

/// Gateway that accepts every payment
pub struct FakeGateway {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayPayment {
            payment_url: format!("https://paysuite.tech/pay/{}", request.reference),
            gateway_payment_id: Some(format!("ps_{}", request.reference)),
        })
    }
}

/// Notifier that counts deliveries and reports the configured result
pub struct CountingNotifier {
    pub sent: AtomicUsize,
    pub succeed: bool,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, _user_id: &str, _notification: &Notification) -> bool {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.succeed
    }
}

/// Replica whose every call fails
pub struct UnavailableReplica;

#[async_trait]
impl PaymentReplica for UnavailableReplica {
    async fn save_payment(&self, _payment: &PaymentRecord) -> Result<(), ReplicaError> {
        Err(unavailable())
    }

    async fn update_status(&self, _payment: &PaymentRecord) -> Result<(), ReplicaError> {
        Err(unavailable())
    }

    async fn record_points(&self, _credit: &PointsCredit) -> Result<(), ReplicaError> {
        Err(unavailable())
    }
}

fn unavailable() -> ReplicaError {
    ReplicaError::Status {
        status: 503,
        body: "Service Unavailable".to_string(),
    }
}

/// Fully wired services over one in-memory store
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<CountingNotifier>,
    pub service: Arc<PaymentService>,
    pub ingress: Arc<WebhookIngress>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(NoReplica), true)
    }

    /// Replica and push provider both down
    pub fn with_failing_side_effects() -> Self {
        Self::build(Arc::new(UnavailableReplica), false)
    }

    fn build(replica: Arc<dyn PaymentReplica>, notifications_succeed: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway {
            calls: AtomicUsize::new(0),
        });
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            succeed: notifications_succeed,
        });

        let machine = Arc::new(PaymentStateMachine::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            replica.clone(),
        ));
        let ingress = Arc::new(WebhookIngress::new(
            SignatureVerifier::new(Some(TEST_WEBHOOK_SECRET), TOLERANCE_SECS),
            machine.clone(),
            store.clone(),
        ));
        let service = Arc::new(PaymentService::new(
            store.clone(),
            gateway.clone(),
            replica,
            machine,
            PaymentPolicy::default(),
        ));

        Self {
            store,
            gateway,
            notifier,
            service,
            ingress,
        }
    }
}

/// Generate a JWT token for testing, valid for one hour
pub fn create_test_token(user_id: &str, admin: bool) -> String {
    encode(
        &Header::default(),
        &Claims::new(user_id, admin, 1),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to create test token")
}

/// Serialized webhook body; `data` fields are merged over the reference
pub fn webhook_body(event: &str, reference: &str, data: Value) -> Vec<u8> {
    let mut fields = json!({ "reference": reference });
    if let (Some(target), Value::Object(extra)) = (fields.as_object_mut(), data) {
        target.extend(extra);
    }
    serde_json::to_vec(&json!({ "event": event, "data": fields }))
        .expect("Failed to serialize webhook body")
}

/// Body of a `payment.success` delivery
pub fn success_body(reference: &str) -> Vec<u8> {
    webhook_body(
        "payment.success",
        reference,
        json!({ "id": 4412, "transaction_id": "MP240101.1200.A00001", "amount": 5.0 }),
    )
}

/// Hex signature the gateway would send
pub fn sign(body: &[u8]) -> String {
    SignatureVerifier::new(Some(TEST_WEBHOOK_SECRET), TOLERANCE_SECS)
        .sign(body)
        .expect("Failed to sign webhook body")
}

//! Payment Service
//!
//! Synchronous payment operations for authenticated users: originate a payment
//! at the gateway, query one, list a user's payments and cancel a pending one.
//!
//! Origination persists the `pending` record before calling the gateway, so a
//! gateway failure leaves a record the user can retry against or cancel, and a
//! webhook can never arrive for a payment the store does not know.

use chrono::Utc;
use metrics::counter;
use serde_json::Value;
use shared::models::{Amount, NewPayment, Operator, PaymentRecord, PaymentStatus};
use shared::policy::{PaymentPolicy, PolicyError};
use std::sync::Arc;
use thiserror::Error;

use crate::repositories::{PaymentStore, StoreError};
use crate::services::paysuite::{GatewayError, GatewayPaymentRequest, PaymentGateway};
use crate::services::replica::{best_effort, PaymentReplica};
use crate::services::state_machine::{ApplyError, CancelOutcome, PaymentStateMachine};
use crate::validators::{detect_operator, generate_reference, normalize_phone, validate_reference};

/// Default page size for payment listings
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest accepted page size
pub const MAX_PAGE_SIZE: i64 = 100;

/// Payment operation errors
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Could not detect the operator for {0}; please specify one")]
    OperatorUndetected(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] PolicyError),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Payment reference already exists: {0}")]
    DuplicateReference(String),

    #[error("Payment not found: {0}")]
    NotFound(String),

    #[error("Not allowed to access this payment")]
    Forbidden,

    #[error("Payment is already {status}")]
    AlreadyFinal {
        reference: String,
        status: PaymentStatus,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Storage failure: {0}")]
    Storage(StoreError),
}

impl PaymentError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidPhone(_) => "INVALID_PHONE",
            PaymentError::OperatorUndetected(_) => "OPERATOR_UNDETECTED",
            PaymentError::InvalidAmount(_) => "INVALID_AMOUNT",
            PaymentError::InvalidReference(_) => "INVALID_REFERENCE",
            PaymentError::InvalidPagination(_) => "INVALID_PAGINATION",
            PaymentError::DuplicateReference(_) => "DUPLICATE_REFERENCE",
            PaymentError::NotFound(_) => "PAYMENT_NOT_FOUND",
            PaymentError::Forbidden => "FORBIDDEN",
            PaymentError::AlreadyFinal { .. } => "ALREADY_FINAL",
            PaymentError::Gateway(GatewayError::Timeout) => "GATEWAY_TIMEOUT",
            PaymentError::Gateway(_) => "GATEWAY_ERROR",
            PaymentError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateReference(reference) => PaymentError::DuplicateReference(reference),
            other => PaymentError::Storage(other),
        }
    }
}

impl From<ApplyError> for PaymentError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::PaymentNotFound(reference) => PaymentError::NotFound(reference),
            ApplyError::Storage(e) => PaymentError::Storage(e),
        }
    }
}

/// The authenticated user performing an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub is_admin: bool,
}

impl Caller {
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}

/// Input for [`PaymentService::create`]
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub user_id: String,
    pub amount: Amount,
    pub phone_number: String,
    /// Detected from the phone prefix when absent
    pub operator: Option<Operator>,
    pub currency: Option<String>,
    /// Generated when absent
    pub reference: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

/// A payment accepted by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub reference: String,
    pub payment_url: String,
    pub points_earned: i64,
    pub operator: Operator,
}

/// One page of a user's payments
#[derive(Debug, Clone)]
pub struct PaymentPage {
    pub payments: Vec<PaymentRecord>,
    pub page: i64,
    pub limit: i64,
}

impl PaymentPage {
    /// A full page suggests more records may follow
    pub fn has_more(&self) -> bool {
        self.payments.len() as i64 == self.limit
    }
}

pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    replica: Arc<dyn PaymentReplica>,
    machine: Arc<PaymentStateMachine>,
    policy: PaymentPolicy,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        replica: Arc<dyn PaymentReplica>,
        machine: Arc<PaymentStateMachine>,
        policy: PaymentPolicy,
    ) -> Self {
        Self {
            payments,
            gateway,
            replica,
            machine,
            policy,
        }
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    /// Originate a payment
    ///
    /// All input checks run before anything is written or sent.
    pub async fn create(&self, request: CreatePayment) -> Result<CreatedPayment, PaymentError> {
        let phone_number = normalize_phone(&request.phone_number)
            .ok_or_else(|| PaymentError::InvalidPhone(request.phone_number.clone()))?;

        let operator = request
            .operator
            .or_else(|| detect_operator(&phone_number))
            .ok_or_else(|| PaymentError::OperatorUndetected(phone_number.clone()))?;

        self.policy.check_amount(request.amount)?;

        let reference = match request.reference {
            Some(reference) => {
                validate_reference(&reference)
                    .map_err(|_| PaymentError::InvalidReference(reference.clone()))?;
                reference
            }
            None => generate_reference(),
        };

        let points_earned = self.policy.points_for(request.amount);
        let currency = request
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.policy.default_currency.clone());

        let payment = self
            .payments
            .insert(NewPayment {
                reference: reference.clone(),
                user_id: request.user_id,
                amount: request.amount,
                currency,
                operator,
                phone_number,
                points_earned,
                description: request.description,
                metadata: request.metadata.unwrap_or_else(|| Value::Object(Default::default())),
            })
            .await?;

        tracing::info!(
            reference = %payment.reference,
            user_id = %payment.user_id,
            amount = %payment.amount,
            operator = %payment.operator,
            points = payment.points_earned,
            "Payment created"
        );

        best_effort(
            "save_payment",
            &payment.reference,
            self.replica.save_payment(&payment).await,
        );

        let gateway_request = GatewayPaymentRequest {
            reference: payment.reference.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            operator: payment.operator,
            phone_number: payment.phone_number.clone(),
            description: payment.description.clone(),
        };

        match self.gateway.create_payment(&gateway_request).await {
            Ok(created) => {
                counter!("payments_created_total", "outcome" => "created").increment(1);
                Ok(CreatedPayment {
                    reference: payment.reference,
                    payment_url: created.payment_url,
                    points_earned: payment.points_earned,
                    operator: payment.operator,
                })
            }
            Err(e) => {
                counter!("payments_created_total", "outcome" => "gateway_error").increment(1);
                tracing::warn!(
                    reference = %payment.reference,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Gateway rejected payment; record left pending"
                );
                Err(e.into())
            }
        }
    }

    /// Look up a payment the caller may see
    pub async fn status(
        &self,
        caller: &Caller,
        reference: &str,
    ) -> Result<PaymentRecord, PaymentError> {
        let payment = self
            .payments
            .find(reference)
            .await?
            .ok_or_else(|| PaymentError::NotFound(reference.to_string()))?;

        if !caller.can_access(&payment.user_id) {
            return Err(PaymentError::Forbidden);
        }
        Ok(payment)
    }

    /// A page of `user_id`'s payments, newest first
    ///
    /// `limit` defaults to 20 and must be within `1..=100`; `page` is 1-based.
    pub async fn list_for_user(
        &self,
        caller: &Caller,
        user_id: &str,
        limit: Option<i64>,
        page: Option<i64>,
    ) -> Result<PaymentPage, PaymentError> {
        if !caller.can_access(user_id) {
            return Err(PaymentError::Forbidden);
        }

        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let page = page.unwrap_or(1);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(PaymentError::InvalidPagination(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if page < 1 {
            return Err(PaymentError::InvalidPagination(
                "page must be at least 1".to_string(),
            ));
        }

        let offset = (page - 1).saturating_mul(limit);
        let payments = self.payments.list_for_user(user_id, limit, offset).await?;

        Ok(PaymentPage {
            payments,
            page,
            limit,
        })
    }

    /// Cancel a pending payment on behalf of its owner (or an admin)
    pub async fn cancel(
        &self,
        caller: &Caller,
        reference: &str,
    ) -> Result<PaymentRecord, PaymentError> {
        let payment = self.status(caller, reference).await?;
        if payment.status.is_terminal() {
            return Err(PaymentError::AlreadyFinal {
                reference: payment.reference,
                status: payment.status,
            });
        }

        match self.machine.cancel(reference, Utc::now()).await? {
            CancelOutcome::Cancelled(payment) => Ok(payment),
            CancelOutcome::AlreadyFinal(payment) => Err(PaymentError::AlreadyFinal {
                reference: payment.reference,
                status: payment.status,
            }),
        }
    }

    pub async fn health(&self) -> Result<(), PaymentError> {
        self.payments.health().await.map_err(PaymentError::Storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use crate::services::notifier::LogNotifier;
    use crate::services::paysuite::GatewayPayment;
    use crate::services::replica::NoReplica;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn create_payment(
                &self,
                request: &GatewayPaymentRequest,
            ) -> Result<GatewayPayment, GatewayError>;
        }
    }

    // ========================================================================
    // Fixtures
    // ========================================================================

    fn accepting_gateway() -> MockGateway {
        let mut gateway = MockGateway::new();
        gateway.expect_create_payment().returning(|req| {
            Ok(GatewayPayment {
                payment_url: format!("https://paysuite.tech/pay/{}", req.reference),
                gateway_payment_id: Some("991".to_string()),
            })
        });
        gateway
    }

    fn service_with(store: Arc<MemoryStore>, gateway: MockGateway) -> PaymentService {
        let machine = Arc::new(PaymentStateMachine::new(
            store.clone(),
            store.clone(),
            Arc::new(LogNotifier),
            Arc::new(NoReplica),
        ));
        PaymentService::new(
            store,
            Arc::new(gateway),
            Arc::new(NoReplica),
            machine,
            PaymentPolicy::default(),
        )
    }

    fn owner() -> Caller {
        Caller {
            user_id: "user-1".to_string(),
            is_admin: false,
        }
    }

    fn stranger() -> Caller {
        Caller {
            user_id: "user-2".to_string(),
            is_admin: false,
        }
    }

    fn request(amount_minor: i64, phone: &str) -> CreatePayment {
        CreatePayment {
            user_id: "user-1".to_string(),
            amount: Amount::from_minor(amount_minor),
            phone_number: phone.to_string(),
            operator: Some(Operator::Mpesa),
            currency: None,
            reference: None,
            description: None,
            metadata: None,
        }
    }

    // ========================================================================
    // Create tests
    // ========================================================================

    #[tokio::test]
    async fn test_create_persists_pending_record() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_payment()
            .withf(|req| {
                req.phone_number == "258841234567"
                    && req.operator == Operator::Mpesa
                    && req.amount == Amount::from_minor(500)
                    && req.currency == "MZN"
            })
            .times(1)
            .returning(|_| {
                Ok(GatewayPayment {
                    payment_url: "https://paysuite.tech/pay/1".to_string(),
                    gateway_payment_id: None,
                })
            });
        let service = service_with(store.clone(), gateway);

        let created = service.create(request(500, "841234567")).await.unwrap();

        assert_eq!(created.points_earned, 6);
        assert_eq!(created.payment_url, "https://paysuite.tech/pay/1");
        let stored = store.find(&created.reference).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.phone_number, "258841234567");
        assert_eq!(stored.points_earned, 6);
        assert_eq!(stored.metadata, json!({}));
    }

    #[tokio::test]
    async fn test_create_detects_operator_from_prefix() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, accepting_gateway());

        let mut req = request(150, "+258 87 123 4567");
        req.operator = None;
        let created = service.create(req).await.unwrap();

        assert_eq!(created.operator, Operator::Emola);
        assert_eq!(created.points_earned, 1);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_before_gateway() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockGateway::new();
        gateway.expect_create_payment().never();
        let service = service_with(store.clone(), gateway);

        let bad_phone = service.create(request(500, "12345")).await.unwrap_err();
        assert_eq!(bad_phone.code(), "INVALID_PHONE");

        let too_small = service.create(request(50, "841234567")).await.unwrap_err();
        assert_eq!(too_small.code(), "INVALID_AMOUNT");

        let too_large = service
            .create(request(1_000_001, "841234567"))
            .await
            .unwrap_err();
        assert_eq!(too_large.code(), "INVALID_AMOUNT");

        let mut bad_reference = request(500, "841234567");
        bad_reference.reference = Some("has spaces".to_string());
        assert_eq!(
            service.create(bad_reference).await.unwrap_err().code(),
            "INVALID_REFERENCE"
        );

        assert!(store.list_for_user("user-1", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_reference() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, accepting_gateway());

        let mut req = request(500, "841234567");
        req.reference = Some("INF42".to_string());
        service.create(req.clone()).await.unwrap();

        let err = service.create(req).await.unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateReference(r) if r == "INF42"));
    }

    #[tokio::test]
    async fn test_gateway_timeout_leaves_pending_record() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_payment()
            .returning(|_| Err(GatewayError::Timeout));
        let service = service_with(store.clone(), gateway);

        let mut req = request(500, "841234567");
        req.reference = Some("INF7".to_string());
        let err = service.create(req).await.unwrap_err();

        assert_eq!(err.code(), "GATEWAY_TIMEOUT");
        assert_eq!(
            store.find("INF7").await.unwrap().unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_gateway_api_error_code() {
        let store = Arc::new(MemoryStore::new());
        let mut gateway = MockGateway::new();
        gateway.expect_create_payment().returning(|_| {
            Err(GatewayError::Api {
                status: 422,
                message: "Invalid phone".to_string(),
                code: None,
            })
        });
        let service = service_with(store, gateway);

        let err = service.create(request(500, "841234567")).await.unwrap_err();
        assert_eq!(err.code(), "GATEWAY_ERROR");
    }

    // ========================================================================
    // Query tests
    // ========================================================================

    #[tokio::test]
    async fn test_status_checks_ownership() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, accepting_gateway());
        let created = service.create(request(500, "841234567")).await.unwrap();

        assert!(service.status(&owner(), &created.reference).await.is_ok());
        assert!(matches!(
            service.status(&stranger(), &created.reference).await,
            Err(PaymentError::Forbidden)
        ));

        let admin = Caller {
            user_id: "ops".to_string(),
            is_admin: true,
        };
        assert!(service.status(&admin, &created.reference).await.is_ok());
        assert!(matches!(
            service.status(&owner(), "NOPE").await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, accepting_gateway());
        for i in 0..3 {
            let mut req = request(500, "841234567");
            req.reference = Some(format!("INF{}", i));
            service.create(req).await.unwrap();
        }

        let first = service
            .list_for_user(&owner(), "user-1", Some(2), None)
            .await
            .unwrap();
        assert_eq!(first.payments.len(), 2);
        assert!(first.has_more());

        let second = service
            .list_for_user(&owner(), "user-1", Some(2), Some(2))
            .await
            .unwrap();
        assert_eq!(second.payments.len(), 1);
        assert!(!second.has_more());

        assert!(matches!(
            service.list_for_user(&owner(), "user-1", Some(0), None).await,
            Err(PaymentError::InvalidPagination(_))
        ));
        assert!(matches!(
            service.list_for_user(&owner(), "user-1", Some(101), None).await,
            Err(PaymentError::InvalidPagination(_))
        ));
        assert!(matches!(
            service.list_for_user(&owner(), "user-1", None, Some(0)).await,
            Err(PaymentError::InvalidPagination(_))
        ));
        assert!(matches!(
            service.list_for_user(&stranger(), "user-1", None, None).await,
            Err(PaymentError::Forbidden)
        ));
    }

    // ========================================================================
    // Cancel tests
    // ========================================================================

    #[tokio::test]
    async fn test_cancel_pending_then_already_final() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store, accepting_gateway());
        let created = service.create(request(500, "841234567")).await.unwrap();

        assert!(matches!(
            service.cancel(&stranger(), &created.reference).await,
            Err(PaymentError::Forbidden)
        ));

        let cancelled = service.cancel(&owner(), &created.reference).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);

        let err = service.cancel(&owner(), &created.reference).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::AlreadyFinal {
                status: PaymentStatus::Cancelled,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Payment is already cancelled");
    }
}

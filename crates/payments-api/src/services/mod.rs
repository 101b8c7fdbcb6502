//! Business logic services for the payments API
//!
//! Webhook path: [`signature`] → [`payload`] → [`state_machine`], wired by
//! [`webhook_ingress`]. User path: [`payment_service`] with the [`paysuite`]
//! gateway client. [`notifier`] and [`replica`] are best-effort collaborators.

pub mod notifier;
pub mod payload;
pub mod payment_service;
pub mod paysuite;
pub mod replica;
pub mod signature;
pub mod state_machine;
pub mod webhook_ingress;

pub use notifier::{FcmNotifier, LogNotifier, Notification, NotificationKind, Notifier};
pub use payload::{PayloadError, WebhookEvent};
pub use payment_service::{
    Caller, CreatePayment, CreatedPayment, PaymentError, PaymentPage, PaymentService,
};
pub use paysuite::{GatewayError, PaySuiteClient, PaymentGateway};
pub use replica::{NoReplica, ParseReplica, PaymentReplica, ReplicaError};
pub use signature::{SignatureError, SignatureVerifier};
pub use state_machine::{ApplyError, ApplyOutcome, PaymentStateMachine};
pub use webhook_ingress::{InboundWebhook, IngressError, WebhookIngress};

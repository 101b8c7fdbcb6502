//! Webhook Ingress Pipeline
//!
//! Signature verification, payload validation and state machine application for
//! one gateway delivery, with every attempt written to the webhook audit trail.
//! Audit writes are best-effort and never change the outcome.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::Value;
use shared::models::{WebhookLogEntry, WebhookLogKind};
use std::sync::Arc;
use thiserror::Error;

use crate::repositories::WebhookAudit;
use crate::services::payload::{self, PayloadError, WebhookEvent};
use crate::services::signature::{SignatureError, SignatureVerifier};
use crate::services::state_machine::{ApplyError, ApplyOutcome, PaymentStateMachine};

/// Why a delivery was not accepted
#[derive(Debug, Error)]
pub enum IngressError {
    #[error(transparent)]
    Authentication(#[from] SignatureError),

    #[error(transparent)]
    Validation(#[from] PayloadError),

    #[error(transparent)]
    Processing(#[from] ApplyError),
}

/// One inbound delivery as received on the wire
#[derive(Debug, Clone, Copy)]
pub struct InboundWebhook<'a> {
    pub body: &'a [u8],
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub source_ip: Option<&'a str>,
}

pub struct WebhookIngress {
    verifier: SignatureVerifier,
    machine: Arc<PaymentStateMachine>,
    audit: Arc<dyn WebhookAudit>,
}

impl WebhookIngress {
    pub fn new(
        verifier: SignatureVerifier,
        machine: Arc<PaymentStateMachine>,
        audit: Arc<dyn WebhookAudit>,
    ) -> Self {
        Self {
            verifier,
            machine,
            audit,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.verifier.is_configured()
    }

    /// Authenticate, validate and apply one delivery
    pub async fn handle(
        &self,
        inbound: InboundWebhook<'_>,
        now: DateTime<Utc>,
    ) -> Result<ApplyOutcome, IngressError> {
        if let Err(e) = self
            .verifier
            .verify(inbound.body, inbound.signature, inbound.timestamp, now)
        {
            tracing::warn!(
                code = e.code(),
                source_ip = ?inbound.source_ip,
                "Webhook rejected: {}",
                e
            );
            counter!("webhook_events_total", "outcome" => "unauthorized").increment(1);

            let mut entry = WebhookLogEntry::new(WebhookLogKind::Rejected, now);
            entry.error = Some(format!("{}: {}", e.code(), e));
            entry.source_ip = inbound.source_ip.map(str::to_string);
            self.audit(entry).await;
            return Err(e.into());
        }

        let event = match payload::parse(inbound.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(code = e.code(), "Webhook payload rejected: {}", e);
                counter!("webhook_events_total", "outcome" => "invalid").increment(1);

                let mut entry = WebhookLogEntry::new(WebhookLogKind::Rejected, now);
                entry.payload = Some(lossy_payload(inbound.body));
                entry.error = Some(format!("{}: {}", e.code(), e));
                entry.source_ip = inbound.source_ip.map(str::to_string);
                self.audit(entry).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            event = %event.kind,
            reference = %event.reference,
            "Webhook received"
        );
        self.audit(log_entry(WebhookLogKind::Received, &event, inbound.source_ip, now))
            .await;

        match self.machine.apply(&event, now).await {
            Ok(outcome) => {
                let (kind, label) = match &outcome {
                    ApplyOutcome::Transitioned { .. } => (WebhookLogKind::Processed, "processed"),
                    ApplyOutcome::Duplicate { .. } => (WebhookLogKind::Processed, "duplicate"),
                    ApplyOutcome::Unhandled { .. } => (WebhookLogKind::Unhandled, "unhandled"),
                };
                counter!("webhook_events_total", "outcome" => label).increment(1);
                self.audit(log_entry(kind, &event, inbound.source_ip, Utc::now()))
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                let label = match &e {
                    ApplyError::PaymentNotFound(_) => {
                        tracing::warn!(reference = %event.reference, "Webhook for unknown payment");
                        "not_found"
                    }
                    ApplyError::Storage(err) => {
                        tracing::error!(
                            reference = %event.reference,
                            error = %err,
                            "Webhook processing failed"
                        );
                        "error"
                    }
                };
                counter!("webhook_events_total", "outcome" => label).increment(1);

                let mut entry =
                    log_entry(WebhookLogKind::Failed, &event, inbound.source_ip, Utc::now());
                entry.error = Some(e.to_string());
                self.audit(entry).await;
                Err(e.into())
            }
        }
    }

    async fn audit(&self, entry: WebhookLogEntry) {
        if let Err(e) = self.audit.record(&entry).await {
            tracing::warn!(
                kind = entry.kind.as_str(),
                error = %e,
                "Failed to write webhook audit entry"
            );
        }
    }
}

fn log_entry(
    kind: WebhookLogKind,
    event: &WebhookEvent,
    source_ip: Option<&str>,
    at: DateTime<Utc>,
) -> WebhookLogEntry {
    let mut entry = WebhookLogEntry::new(kind, at);
    entry.event = Some(event.kind.as_str().to_string());
    entry.reference = Some(event.reference.clone());
    entry.payload = Some(event.raw.clone());
    entry.source_ip = source_ip.map(str::to_string);
    entry
}

/// The body as JSON when it parses, otherwise as a (lossy) string
fn lossy_payload(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

//! PaySuite webhook handlers
//!
//! The body is taken as raw bytes: the signature covers exactly what was sent,
//! so it must be verified before any JSON parsing.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;

use super::helpers::ingress_error_response;
use crate::middleware::request_id::request_id;
use crate::models::{WebhookAck, WebhookHealth};
use crate::services::{InboundWebhook, WebhookIngress};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Receive one gateway delivery
///
/// POST /webhook/paysuite
pub async fn paysuite_webhook(
    ingress: web::Data<WebhookIngress>,
    req: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let connection = req.connection_info().clone();
    let inbound = InboundWebhook {
        body: &body,
        signature: header(&req, SIGNATURE_HEADER),
        timestamp: header(&req, TIMESTAMP_HEADER),
        source_ip: connection.realip_remote_addr(),
    };

    match ingress.handle(inbound, Utc::now()).await {
        Ok(outcome) => {
            let ack = WebhookAck::from_outcome(&outcome, Utc::now());
            tracing::debug!(
                request_id = ?request_id(&req),
                result = %ack.result,
                "Webhook acknowledged"
            );
            HttpResponse::Ok().json(ack)
        }
        Err(e) => {
            tracing::debug!(request_id = ?request_id(&req), error = %e, "Webhook not accepted");
            ingress_error_response(&e)
        }
    }
}

/// GET /webhook/health
pub async fn webhook_health(ingress: web::Data<WebhookIngress>) -> impl Responder {
    HttpResponse::Ok().json(WebhookHealth {
        status: "healthy",
        service: "Webhook Processor",
        signature_configured: ingress.is_configured(),
        timestamp: Utc::now(),
    })
}

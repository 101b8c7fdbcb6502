//! Health check endpoint

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::services::PaymentService;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub version: String,
}

/// Health check endpoint
///
/// Returns 503 when the payment store cannot be reached.
pub async fn health_check(service: web::Data<PaymentService>) -> impl Responder {
    let db_status = match service.health().await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check: storage unreachable");
            "disconnected"
        }
    };

    let response = HealthResponse {
        status: if db_status == "connected" {
            "healthy"
        } else {
            "unhealthy"
        }
        .to_string(),
        database: db_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    if db_status == "connected" {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

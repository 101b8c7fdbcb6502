//! Common Handler Helpers
//!
//! Shared patterns for the payment and webhook handlers so that every endpoint
//! answers with the same `ErrorResponse` shape.
//!
//! # Helper Categories
//!
//! ## Authentication
//! - [`extract_caller_or_unauthorized`] - Caller from the JWT middleware or 401
//!
//! ## Validation
//! - [`validate_request`] - Validate a request or return 400
//!
//! ## Error Handling
//! - [`payment_error_response`] - Map a [`PaymentError`] to its HTTP status
//! - [`ingress_error_response`] - Map an [`IngressError`] to its HTTP status
//! - [`safe_internal_error`] - 500 without implementation details

use actix_web::{HttpRequest, HttpResponse};
use validator::Validate;

use crate::middleware::caller_from_request;
use crate::models::ErrorResponse;
use crate::services::{ApplyError, Caller, GatewayError, IngressError, PaymentError};

// ============================================================================
// Authentication Helpers
// ============================================================================

/// Extract the authenticated [`Caller`] or return 401 Unauthorized
///
/// # Example
///
/// ```ignore
/// let caller = match extract_caller_or_unauthorized(&req_http) {
///     Ok(c) => c,
///     Err(resp) => return resp,
/// };
/// ```
pub fn extract_caller_or_unauthorized(req: &HttpRequest) -> Result<Caller, HttpResponse> {
    caller_from_request(req).ok_or_else(|| {
        HttpResponse::Unauthorized().json(ErrorResponse::new(
            "unauthorized",
            "Authentication required",
        ))
    })
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate a request struct or return 400 Bad Request
///
/// # Example
///
/// ```ignore
/// if let Err(resp) = validate_request(&req) {
///     return resp;
/// }
/// ```
pub fn validate_request<T: Validate>(req: &T) -> Result<(), HttpResponse> {
    req.validate().map_err(|e| {
        HttpResponse::BadRequest().json(ErrorResponse::new(
            "VALIDATION_ERROR",
            format!("Validation failed: {}", e),
        ))
    })
}

/// Return a 400 Bad Request response with a custom code and message
pub fn bad_request(code: &str, message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(code, message))
}

// ============================================================================
// Error Handling Helpers
// ============================================================================

/// Return a safe internal server error that doesn't leak implementation details
///
/// SECURITY: Use this for storage and configuration failures whose cause must
/// never reach the client.
pub fn safe_internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse::new(
        "internal_error",
        "An internal error occurred. Please try again later.",
    ))
}

/// Map a payment service error to an HTTP response
///
/// Storage failures are logged here and answered with [`safe_internal_error`].
pub fn payment_error_response(err: &PaymentError) -> HttpResponse {
    let body = ErrorResponse::new(err.code(), err.to_string());

    match err {
        PaymentError::InvalidPhone(_)
        | PaymentError::OperatorUndetected(_)
        | PaymentError::InvalidAmount(_)
        | PaymentError::InvalidReference(_)
        | PaymentError::InvalidPagination(_) => HttpResponse::BadRequest().json(body),
        PaymentError::AlreadyFinal { status, .. } => {
            HttpResponse::BadRequest().json(ErrorResponse::with_details(
                err.code(),
                err.to_string(),
                serde_json::json!({ "status": status }),
            ))
        }
        PaymentError::DuplicateReference(_) => HttpResponse::Conflict().json(body),
        PaymentError::NotFound(_) => HttpResponse::NotFound().json(body),
        PaymentError::Forbidden => HttpResponse::Forbidden().json(body),
        PaymentError::Gateway(gateway) => {
            tracing::error!(error = %gateway, "Payment gateway call failed");
            if matches!(gateway, GatewayError::Timeout) {
                HttpResponse::GatewayTimeout().json(body)
            } else {
                HttpResponse::BadGateway().json(body)
            }
        }
        PaymentError::Storage(e) => {
            tracing::error!(error = %e, "Payment storage failure");
            safe_internal_error()
        }
    }
}

/// Map a webhook ingress error to the status the gateway expects
///
/// 401 tells the gateway the delivery is not ours; 400 that it will never be
/// accepted; 404 that the reference is unknown; 500 asks for a retry.
pub fn ingress_error_response(err: &IngressError) -> HttpResponse {
    match err {
        IngressError::Authentication(e) => HttpResponse::Unauthorized()
            .json(ErrorResponse::new(e.code(), e.to_string())),
        IngressError::Validation(e) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(e.code(), e.to_string()))
        }
        IngressError::Processing(ApplyError::PaymentNotFound(reference)) => {
            HttpResponse::NotFound().json(ErrorResponse::new(
                "PAYMENT_NOT_FOUND",
                format!("Payment not found: {}", reference),
            ))
        }
        IngressError::Processing(ApplyError::Storage(_)) => safe_internal_error(),
    }
}

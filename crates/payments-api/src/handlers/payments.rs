//! Payment handlers
//!
//! Every route here sits behind [`JwtAuth`](crate::middleware::JwtAuth) except
//! [`payments_health`].

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;

use super::helpers::{
    bad_request, extract_caller_or_unauthorized, payment_error_response, validate_request,
};
use crate::models::{
    CancelPaymentResponse, CreatePaymentRequest, CreatePaymentResponse, PaginatedResponse,
    PaginationParams, PaymentStatusResponse, PaymentSummary, SuccessResponse,
};
use crate::services::{Caller, CreatePayment, PaymentService};

/// Create a payment and return the gateway checkout URL
///
/// POST /api/payments/create
pub async fn create_payment(
    service: web::Data<PaymentService>,
    req_http: HttpRequest,
    req: web::Json<CreatePaymentRequest>,
) -> impl Responder {
    let caller = match extract_caller_or_unauthorized(&req_http) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&req.0) {
        return resp;
    }

    let operator = match req.operator() {
        Ok(op) => op,
        Err(raw) => {
            return bad_request(
                "INVALID_OPERATOR",
                format!("Unsupported operator: {}", raw),
            )
        }
    };

    let req = req.into_inner();
    let request = CreatePayment {
        user_id: caller.user_id,
        amount: req.amount,
        phone_number: req.phone_number,
        operator,
        currency: req.currency,
        reference: req.reference,
        description: req.description,
        metadata: req.metadata,
    };

    match service.create(request).await {
        Ok(created) => HttpResponse::Created().json(SuccessResponse::with_message(
            "Payment created successfully",
            CreatePaymentResponse::from(created),
        )),
        Err(e) => payment_error_response(&e),
    }
}

/// Current status of one payment
///
/// GET /api/payments/status/{reference}
pub async fn get_payment_status(
    service: web::Data<PaymentService>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let caller = match extract_caller_or_unauthorized(&req_http) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let reference = path.into_inner();

    match service.status(&caller, &reference).await {
        Ok(payment) => HttpResponse::Ok().json(SuccessResponse::new(
            PaymentStatusResponse::from(payment),
        )),
        Err(e) => payment_error_response(&e),
    }
}

/// Payments of a given user (owner or admin only)
///
/// GET /api/payments/user/{userId}?limit=20&page=1
pub async fn list_user_payments(
    service: web::Data<PaymentService>,
    req_http: HttpRequest,
    path: web::Path<String>,
    query: web::Query<PaginationParams>,
) -> impl Responder {
    let caller = match extract_caller_or_unauthorized(&req_http) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = path.into_inner();

    list_payments(&service, &caller, &user_id, &query).await
}

/// Payments of the authenticated user
///
/// GET /api/payments/my-payments?limit=20&page=1
pub async fn list_my_payments(
    service: web::Data<PaymentService>,
    req_http: HttpRequest,
    query: web::Query<PaginationParams>,
) -> impl Responder {
    let caller = match extract_caller_or_unauthorized(&req_http) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user_id = caller.user_id.clone();

    list_payments(&service, &caller, &user_id, &query).await
}

async fn list_payments(
    service: &PaymentService,
    caller: &Caller,
    user_id: &str,
    query: &PaginationParams,
) -> HttpResponse {
    match service
        .list_for_user(caller, user_id, query.limit, query.page)
        .await
    {
        Ok(page) => {
            let has_more = page.has_more();
            let data = page
                .payments
                .into_iter()
                .map(PaymentSummary::from)
                .collect();
            HttpResponse::Ok().json(PaginatedResponse::new(data, page.page, page.limit, has_more))
        }
        Err(e) => payment_error_response(&e),
    }
}

/// Cancel a pending payment
///
/// POST /api/payments/{reference}/cancel
pub async fn cancel_payment(
    service: web::Data<PaymentService>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    let caller = match extract_caller_or_unauthorized(&req_http) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let reference = path.into_inner();

    match service.cancel(&caller, &reference).await {
        Ok(payment) => {
            tracing::info!(
                reference = %payment.reference,
                user_id = %caller.user_id,
                "Payment cancelled by user"
            );
            HttpResponse::Ok().json(SuccessResponse::with_message(
                "Payment cancelled successfully",
                CancelPaymentResponse::from(payment),
            ))
        }
        Err(e) => payment_error_response(&e),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentsHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub storage: &'static str,
    pub default_currency: String,
}

/// GET /api/payments/health
pub async fn payments_health(service: web::Data<PaymentService>) -> impl Responder {
    let storage_ok = service.health().await.is_ok();
    let body = PaymentsHealth {
        status: if storage_ok { "healthy" } else { "unhealthy" },
        service: "Payments API",
        storage: if storage_ok { "connected" } else { "disconnected" },
        default_currency: service.policy().default_currency.clone(),
    };

    if storage_ok {
        HttpResponse::Ok().json(SuccessResponse::new(body))
    } else {
        HttpResponse::ServiceUnavailable().json(SuccessResponse {
            success: false,
            message: None,
            data: body,
        })
    }
}

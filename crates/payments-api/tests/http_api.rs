//! Integration tests for the HTTP surface
//!
//! Runs the real route table over the in-memory backend: JWT-protected payment
//! endpoints and the signed webhook endpoint.

mod common;

use actix_web::{http::StatusCode, test, web, App};
use chrono::Utc;
use payments_api::middleware::RequestId;
use payments_api::models::ErrorResponse;
use payments_api::routes;
use serde_json::{json, Value};

use common::{create_test_token, sign, success_body, webhook_body, Harness, TEST_JWT_SECRET};

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .wrap(RequestId::new())
                .app_data(web::Data::from($harness.service.clone()))
                .app_data(web::Data::from($harness.ingress.clone()))
                .configure(|cfg| routes::configure(cfg, TEST_JWT_SECRET)),
        )
        .await
    };
}

fn bearer(user_id: &str, admin: bool) -> (&'static str, String) {
    (
        "Authorization",
        format!("Bearer {}", create_test_token(user_id, admin)),
    )
}

fn create_body() -> Value {
    json!({
        "amount": 5.0,
        "phoneNumber": "841234567",
        "operator": "mpesa",
        "description": "Premium subscription"
    })
}

// ============================================================================
// Payment endpoints
// ============================================================================

#[actix_web::test]
async fn test_create_payment_returns_created() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/payments/create")
        .insert_header(bearer("user-1", false))
        .set_json(create_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["pointsEarned"], 6);
    assert_eq!(body["data"]["operator"], "mpesa");
    let reference = body["data"]["reference"].as_str().unwrap();
    assert!(reference.starts_with("INF"));
    assert_eq!(
        body["data"]["paymentUrl"],
        format!("https://paysuite.tech/pay/{}", reference)
    );
}

#[actix_web::test]
async fn test_create_payment_requires_token() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/payments/create")
        .set_json(create_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_create_payment_rejects_bad_input() {
    let harness = Harness::new();
    let app = app!(harness);

    let cases = [
        (json!({ "amount": 5.0, "phoneNumber": "12345" }), "VALIDATION_ERROR"),
        (
            json!({ "amount": 5.0, "phoneNumber": "841234567", "operator": "airtel" }),
            "INVALID_OPERATOR",
        ),
        (
            json!({ "amount": 0.5, "phoneNumber": "841234567" }),
            "INVALID_AMOUNT",
        ),
        (json!({ "phoneNumber": "841234567" }), "VALIDATION_ERROR"),
    ];

    for (payload, code) in cases {
        let req = test::TestRequest::post()
            .uri("/api/payments/create")
            .insert_header(bearer("user-1", false))
            .set_json(&payload)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", payload);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, code, "{}", payload);
    }
}

#[actix_web::test]
async fn test_status_visible_to_owner_and_admin_only() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/payments/create")
        .insert_header(bearer("user-1", false))
        .set_json(create_body())
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let reference = created["data"]["reference"].as_str().unwrap().to_string();
    let uri = format!("/api/payments/status/{}", reference);

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer("user-1", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["pointsEarned"], 6);

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer("someone-else", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer("support", true))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/payments/status/INF0000000000000000")
        .insert_header(bearer("user-1", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_list_payments_pagination() {
    let harness = Harness::new();
    let app = app!(harness);

    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/payments/create")
            .insert_header(bearer("user-1", false))
            .set_json(create_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri("/api/payments/my-payments?limit=2&page=1")
        .insert_header(bearer("user-1", false))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["hasMore"], true);

    let req = test::TestRequest::get()
        .uri("/api/payments/user/user-1?limit=2&page=2")
        .insert_header(bearer("user-1", false))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["hasMore"], false);

    let req = test::TestRequest::get()
        .uri("/api/payments/user/user-1")
        .insert_header(bearer("user-2", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri("/api/payments/my-payments?limit=500")
        .insert_header(bearer("user-1", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_cancel_payment() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/payments/create")
        .insert_header(bearer("user-1", false))
        .set_json(create_body())
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let reference = created["data"]["reference"].as_str().unwrap().to_string();
    let uri = format!("/api/payments/{}/cancel", reference);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer("user-2", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer("user-1", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["status"], "cancelled");

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer("user-1", false))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "ALREADY_FINAL");
    assert_eq!(body.details.unwrap()["status"], "cancelled");
}

// ============================================================================
// Webhook endpoint
// ============================================================================

#[actix_web::test]
async fn test_signed_webhook_completes_payment() {
    let harness = Harness::new();
    let app = app!(harness);

    let req = test::TestRequest::post()
        .uri("/api/payments/create")
        .insert_header(bearer("user-1", false))
        .set_json(create_body())
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let reference = created["data"]["reference"].as_str().unwrap().to_string();

    let body = success_body(&reference);
    let req = test::TestRequest::post()
        .uri("/webhook/paysuite")
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Webhook-Signature", sign(&body)))
        .insert_header((
            "X-Webhook-Timestamp",
            Utc::now().timestamp_millis().to_string(),
        ))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "success");
    assert_eq!(ack["result"], "transitioned");

    // Redelivery is acknowledged as a duplicate
    let req = test::TestRequest::post()
        .uri("/webhook/paysuite")
        .insert_header(("X-Webhook-Signature", sign(&body)))
        .set_payload(body)
        .to_request();
    let ack: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(ack["result"], "duplicate");

    let req = test::TestRequest::get()
        .uri(&format!("/api/payments/status/{}", reference))
        .insert_header(bearer("user-1", false))
        .to_request();
    let status: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["data"]["status"], "completed");
    assert!(status["data"]["confirmedAt"].is_string());
}

#[actix_web::test]
async fn test_webhook_error_statuses() {
    let harness = Harness::new();
    let app = app!(harness);

    // Missing signature
    let body = success_body("INF1700000000000001");
    let req = test::TestRequest::post()
        .uri("/webhook/paysuite")
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(err.error, "MISSING_SIGNATURE");

    // Forged signature
    let req = test::TestRequest::post()
        .uri("/webhook/paysuite")
        .insert_header(("X-Webhook-Signature", "0".repeat(64)))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Unknown reference
    let req = test::TestRequest::post()
        .uri("/webhook/paysuite")
        .insert_header(("X-Webhook-Signature", sign(&body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Unsupported event
    let refunded = webhook_body("payment.refunded", "INF1700000000000001", json!({}));
    let req = test::TestRequest::post()
        .uri("/webhook/paysuite")
        .insert_header(("X-Webhook-Signature", sign(&refunded)))
        .set_payload(refunded)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(err.error, "UNKNOWN_EVENT");
}

// ============================================================================
// Health endpoints
// ============================================================================

#[actix_web::test]
async fn test_health_endpoints_are_public() {
    let harness = Harness::new();
    let app = app!(harness);

    for uri in ["/health", "/webhook/health", "/api/payments/health"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        assert!(resp.headers().contains_key("x-request-id"), "{}", uri);
    }

    let req = test::TestRequest::get().uri("/webhook/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["signature_configured"], true);
}

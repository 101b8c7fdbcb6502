//! Route configuration for the API

use actix_web::{error, web, HttpResponse};

use crate::models::ErrorResponse;
use crate::{handlers, middleware};

/// Largest accepted request body (JSON or raw webhook)
pub const MAX_BODY_BYTES: usize = 65_536;

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest().json(ErrorResponse::new(
                "VALIDATION_ERROR",
                format!("Invalid request body: {}", err),
            ));
            error::InternalError::from_response(err, response).into()
        })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ErrorResponse::new(
            "INVALID_PAGINATION",
            format!("Invalid query string: {}", err),
        ));
        error::InternalError::from_response(err, response).into()
    })
}

/// Configure all routes
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(web::PayloadConfig::new(MAX_BODY_BYTES));

    // Operational endpoints (no auth required)
    cfg.route("/health", web::get().to(handlers::health_check))
        .route("/metrics", web::get().to(middleware::metrics_handler));

    // Gateway webhooks (no auth - uses signature verification)
    cfg.service(
        web::scope("/webhook")
            .route("/paysuite", web::post().to(handlers::paysuite_webhook))
            .route("/health", web::get().to(handlers::webhook_health)),
    );

    // Registered ahead of the protected scope so it stays public
    cfg.route(
        "/api/payments/health",
        web::get().to(handlers::payments_health),
    );

    // Protected routes (JWT auth)
    cfg.service(
        web::scope("/api/payments")
            .wrap(middleware::JwtAuth::new(jwt_secret))
            .route("/create", web::post().to(handlers::create_payment))
            .route(
                "/status/{reference}",
                web::get().to(handlers::get_payment_status),
            )
            .route("/user/{user_id}", web::get().to(handlers::list_user_payments))
            .route("/my-payments", web::get().to(handlers::list_my_payments))
            .route(
                "/{reference}/cancel",
                web::post().to(handlers::cancel_payment),
            ),
    );
}

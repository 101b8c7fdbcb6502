//! Middleware for the payments API

use actix_cors::Cors;
use actix_web::http;
use std::env;

pub mod jwt_auth;
pub mod metrics;
pub mod request_id;

pub use jwt_auth::{caller_from_request, Claims, JwtAuth};
pub use metrics::{init_metrics, metrics_handler, PrometheusMetrics};
pub use request_id::RequestId;

/// Configure CORS middleware
pub fn cors() -> Cors {
    // Format: comma-separated list of origins
    // Example: ALLOWED_ORIGINS=https://app.infoplus.co.mz,https://admin.infoplus.co.mz
    let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();

    let origins: Vec<String> = allowed_origins
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");

            if origins.iter().any(|allowed| origin_str == allowed) {
                return true;
            }

            // Development builds also accept localhost
            cfg!(debug_assertions)
                && (origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1"))
        })
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![
            http::header::AUTHORIZATION,
            http::header::ACCEPT,
            http::header::CONTENT_TYPE,
        ])
        .expose_headers(vec![http::header::HeaderName::from_static("x-request-id")])
        .max_age(3600)
}

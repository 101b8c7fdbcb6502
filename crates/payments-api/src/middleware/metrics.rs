//! Prometheus Metrics Middleware
//!
//! Records per-request HTTP metrics and serves the `/metrics` scrape endpoint.
//!
//! # Metrics Exposed
//!
//! - `http_requests_total` - Counter of HTTP requests
//! - `http_request_duration_seconds` - Histogram of request durations
//! - `http_requests_in_flight` - Gauge of concurrent requests
//!
//! Domain counters (`webhook_events_total`, `payments_created_total`, ...) are
//! recorded by the services and described in [`init_metrics`].
//!
//! Path labels use the matched route pattern (`/api/payments/status/{reference}`)
//! so payment references never become label values.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{
    future::{ready, Ready},
    sync::Arc,
    time::Instant,
};

/// Global Prometheus handle for the /metrics endpoint
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Label used for requests that matched no route
const UNMATCHED_PATH: &str = "unmatched";

/// Install the Prometheus recorder
///
/// Call once at startup, before any metric is recorded. Later calls return the
/// already-installed handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;

            describe_counter!(
                "http_requests_total",
                "Total number of HTTP requests processed"
            );
            describe_histogram!(
                "http_request_duration_seconds",
                "HTTP request duration in seconds"
            );
            describe_gauge!(
                "http_requests_in_flight",
                "Number of HTTP requests currently being processed"
            );
            describe_counter!(
                "webhook_events_total",
                "Gateway webhook deliveries by outcome"
            );
            describe_counter!(
                "webhook_signature_without_timestamp_total",
                "Webhooks accepted without a timestamp header"
            );
            describe_counter!(
                "payments_created_total",
                "Payment originations by outcome"
            );
            describe_counter!(
                "payments_points_credited_total",
                "Reward points credited for completed payments"
            );
            describe_counter!(
                "payments_replica_errors_total",
                "Failed writes to the secondary replica"
            );
            describe_counter!(
                "payments_notifications_total",
                "Push notifications by delivery status"
            );

            Ok(handle)
        })
        .cloned()
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> HttpResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

/// Prometheus metrics middleware for Actix-web
#[derive(Clone)]
pub struct PrometheusMetrics {
    /// Path prefixes excluded from metrics (scrapes and probes)
    excluded_paths: Arc<Vec<String>>,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        Self::with_excluded_paths(vec![
            "/metrics".to_string(),
            "/health".to_string(),
            "/webhook/health".to_string(),
            "/api/payments/health".to_string(),
        ])
    }

    pub fn with_excluded_paths(paths: Vec<String>) -> Self {
        Self {
            excluded_paths: Arc::new(paths),
        }
    }
}

fn is_excluded(excluded_paths: &[String], path: &str) -> bool {
    excluded_paths.iter().any(|p| path.starts_with(p.as_str()))
}

impl<S, B> Transform<S, ServiceRequest> for PrometheusMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = PrometheusMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(PrometheusMetricsMiddleware {
            service,
            excluded_paths: self.excluded_paths.clone(),
        }))
    }
}

pub struct PrometheusMetricsMiddleware<S> {
    service: S,
    excluded_paths: Arc<Vec<String>>,
}

impl<S, B> Service<ServiceRequest> for PrometheusMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_excluded(&self.excluded_paths, req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) });
        }

        let start = Instant::now();
        let method = req.method().to_string();
        let path = req
            .match_pattern()
            .unwrap_or_else(|| UNMATCHED_PATH.to_string());

        gauge!("http_requests_in_flight").increment(1.0);
        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            gauge!("http_requests_in_flight").decrement(1.0);

            let status = match &result {
                Ok(response) => response.status().as_u16(),
                Err(e) => e.as_response_error().status_code().as_u16(),
            }
            .to_string();

            counter!(
                "http_requests_total",
                "method" => method.clone(),
                "path" => path.clone(),
                "status" => status.clone()
            )
            .increment(1);
            histogram!(
                "http_request_duration_seconds",
                "method" => method,
                "path" => path,
                "status" => status
            )
            .record(start.elapsed().as_secs_f64());

            result.map(ServiceResponse::map_into_left_body)
        })
    }
}

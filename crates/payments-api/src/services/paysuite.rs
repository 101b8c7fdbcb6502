//! PaySuite Gateway Client
//!
//! Originates mobile-money payments through the PaySuite REST API. The gateway
//! answers with a hosted `payment_url`; the final outcome arrives later as a
//! webhook.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use shared::config::PaySuiteConfig;
use shared::models::{Amount, Operator};
use std::time::Duration;
use thiserror::Error;

/// User agent sent on every gateway request
pub const USER_AGENT: &str = "InfoPlus-Backend/1.0.0";

/// Description used when the caller supplies none
pub const DEFAULT_DESCRIPTION: &str = "InfoPlus payment";

/// Maximum response body excerpt kept in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Gateway errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("PaySuite API key is not configured")]
    NotConfigured,

    #[error("PaySuite request timed out")]
    Timeout,

    #[error("PaySuite connection failed: {0}")]
    Transport(String),

    #[error("PaySuite API error{}: {message}", code_suffix(.code))]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("Unexpected PaySuite response: {0}")]
    MalformedResponse(String),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" ({})", c)).unwrap_or_default()
}

impl GatewayError {
    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Transport(_))
    }
}

/// Payment originated at the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPayment {
    pub payment_url: String,
    pub gateway_payment_id: Option<String>,
}

/// Request to originate a payment
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayPaymentRequest {
    pub reference: String,
    pub amount: Amount,
    pub currency: String,
    pub operator: Operator,
    pub phone_number: String,
    pub description: Option<String>,
}

/// Payment gateway abstraction
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
    ) -> Result<GatewayPayment, GatewayError>;
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    amount: String,
    reference: &'a str,
    description: &'a str,
    callback_url: &'a str,
    method: &'a str,
    phone_number: &'a str,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaySuiteResponse {
    status: Option<String>,
    message: Option<String>,
    code: Option<String>,
    data: Option<PaySuiteResponseData>,
}

#[derive(Debug, Deserialize)]
struct PaySuiteResponseData {
    payment_url: Option<String>,
    id: Option<serde_json::Value>,
}

/// reqwest-backed PaySuite client
#[derive(Clone)]
pub struct PaySuiteClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    callback_url: String,
}

impl PaySuiteClient {
    pub fn new(config: &PaySuiteConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            callback_url: config.callback_url.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for PaySuiteClient {
    async fn create_payment(
        &self,
        request: &GatewayPaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::NotConfigured)?;

        let body = CreatePaymentBody {
            amount: request.amount.to_string(),
            reference: &request.reference,
            description: request.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION),
            callback_url: &self.callback_url,
            method: request.operator.as_str(),
            phone_number: &request.phone_number,
            currency: &request.currency,
        };

        tracing::debug!(
            reference = %request.reference,
            method = %request.operator,
            amount = %request.amount,
            "Sending payment request to PaySuite"
        );

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .bearer_auth(api_key)
            .header(header::ACCEPT, "application/json")
            .header("X-Request-ID", &request.reference)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Transport(e.to_string())
            }
        })?;

        let result = interpret_response(status, &text);
        match &result {
            Ok(payment) => tracing::info!(
                reference = %request.reference,
                gateway_payment_id = ?payment.gateway_payment_id,
                "PaySuite payment created"
            ),
            Err(e) => tracing::error!(
                reference = %request.reference,
                http_status = status,
                error = %e,
                "PaySuite payment request failed"
            ),
        }
        result
    }
}

/// Map a gateway HTTP response to the payment URL or an error
fn interpret_response(status: u16, body: &str) -> Result<GatewayPayment, GatewayError> {
    let http_ok = (200..300).contains(&status);
    let parsed: PaySuiteResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if http_ok => return Err(GatewayError::MalformedResponse(e.to_string())),
        Err(_) => {
            return Err(GatewayError::Api {
                status,
                message: excerpt(body),
                code: None,
            })
        }
    };

    if !http_ok || parsed.status.as_deref() != Some("success") {
        return Err(GatewayError::Api {
            status,
            message: parsed
                .message
                .unwrap_or_else(|| "Unknown error".to_string()),
            code: parsed.code,
        });
    }

    let data = parsed
        .data
        .ok_or_else(|| GatewayError::MalformedResponse("missing data".to_string()))?;
    let payment_url = data
        .payment_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GatewayError::MalformedResponse("missing data.payment_url".to_string()))?;

    let gateway_payment_id = data.id.and_then(|id| match id {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(GatewayPayment {
        payment_url,
        gateway_payment_id,
    })
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY_LEN {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

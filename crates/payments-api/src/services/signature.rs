//! Webhook Signature Verification
//!
//! PaySuite signs the raw request body with HMAC-SHA256 using the shared webhook
//! secret and sends the digest in `X-Webhook-Signature`. An optional
//! `X-Webhook-Timestamp` (epoch milliseconds) is checked against a tolerance
//! window to reject replays.
//!
//! # Security
//!
//! - The MAC is computed over the exact bytes received, never a re-serialization
//! - One comparison policy: the received value is decoded to digest bytes (hex,
//!   or the legacy base64 form) and compared in constant time
//! - A missing secret rejects every request
//! - An unparsable timestamp rejects the request; a missing one is tolerated and
//!   counted

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use metrics::counter;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 digest length in bytes
const DIGEST_LEN: usize = 32;

/// Default replay window (5 minutes)
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Upper bound keeping the window representable as a `chrono::Duration`
const MAX_TOLERANCE_SECS: u64 = (i64::MAX / 1000) as u64;

/// Reasons a webhook fails authentication
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing webhook signature header")]
    MissingSignature,

    #[error("Webhook secret is not configured")]
    NotConfigured,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook timestamp outside tolerance window")]
    ReplaySuspected,

    #[error("Malformed webhook timestamp: {0}")]
    MalformedTimestamp(String),
}

impl SignatureError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SignatureError::MissingSignature => "MISSING_SIGNATURE",
            SignatureError::NotConfigured => "NOT_CONFIGURED",
            SignatureError::InvalidSignature => "INVALID_SIGNATURE",
            SignatureError::ReplaySuspected => "REPLAY_SUSPECTED",
            SignatureError::MalformedTimestamp(_) => "MALFORMED_TIMESTAMP",
        }
    }
}

/// Successful verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verified {
    /// `false` when the request carried no timestamp and was accepted without
    /// replay protection
    pub timestamp_present: bool,
}

/// HMAC-SHA256 webhook verifier
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<Vec<u8>>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("configured", &self.secret.is_some())
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: Option<&str>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.map(|s| s.as_bytes().to_vec()),
            tolerance: Duration::seconds(tolerance_secs.min(MAX_TOLERANCE_SECS) as i64),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify a webhook delivery
    ///
    /// # Arguments
    ///
    /// * `body` - Raw request body bytes
    /// * `signature` - `X-Webhook-Signature` header value, if any
    /// * `timestamp` - `X-Webhook-Timestamp` header value (epoch millis), if any
    /// * `now` - Current time
    pub fn verify(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Verified, SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::MissingSignature)?;
        let secret = self.secret.as_deref().ok_or(SignatureError::NotConfigured)?;

        let timestamp_present = match timestamp.map(str::trim).filter(|t| !t.is_empty()) {
            Some(raw) => {
                self.check_timestamp(raw, now)?;
                true
            }
            None => false,
        };

        let received = decode_signature(signature).ok_or(SignatureError::InvalidSignature)?;
        let expected = compute_digest(secret, body)?;

        if !bool::from(expected.as_slice().ct_eq(received.as_slice())) {
            return Err(SignatureError::InvalidSignature);
        }

        if !timestamp_present {
            tracing::warn!("Webhook accepted without timestamp: replay protection skipped");
            counter!("webhook_signature_without_timestamp_total").increment(1);
        }

        Ok(Verified { timestamp_present })
    }

    /// Produce the lowercase hex signature the gateway would send for `body`
    pub fn sign(&self, body: &[u8]) -> Result<String, SignatureError> {
        let secret = self.secret.as_deref().ok_or(SignatureError::NotConfigured)?;
        Ok(hex::encode(compute_digest(secret, body)?))
    }

    fn check_timestamp(&self, raw: &str, now: DateTime<Utc>) -> Result<(), SignatureError> {
        let millis: i64 = raw
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp(raw.to_string()))?;
        let sent_at = DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| SignatureError::MalformedTimestamp(raw.to_string()))?;

        let skew = (now - sent_at).abs();
        if skew > self.tolerance {
            tracing::warn!(
                skew_ms = skew.num_milliseconds(),
                "Webhook timestamp outside tolerance window"
            );
            return Err(SignatureError::ReplaySuspected);
        }
        Ok(())
    }
}

fn compute_digest(secret: &[u8], body: &[u8]) -> Result<[u8; DIGEST_LEN], SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::NotConfigured)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().into())
}

/// Decode a received signature: 64 hex characters, else legacy base64
fn decode_signature(signature: &str) -> Option<Vec<u8>> {
    let bytes = if signature.len() == DIGEST_LEN * 2
        && signature.chars().all(|c| c.is_ascii_hexdigit())
    {
        hex::decode(signature).ok()?
    } else {
        BASE64.decode(signature).ok()?
    };

    (bytes.len() == DIGEST_LEN).then_some(bytes)
}

//! Custom validators for payment requests
//!
//! Mozambique mobile numbers: optional `+258`/`258` country code, then `8`, a
//! carrier digit in `2..=7`, then seven digits.

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use shared::Operator;

/// Mobile number after whitespace removal
pub static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\+258|258)?8[2-7][0-9]{7}$").expect("Invalid phone regex"));

/// Country calling code prepended to normalized numbers
pub const COUNTRY_CODE: &str = "258";

/// Prefix of generated payment references
pub const REFERENCE_PREFIX: &str = "INF";

/// Maximum reference length accepted by the gateway
pub const MAX_REFERENCE_LEN: usize = 20;

fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Check a phone number against the numbering plan
pub fn is_valid_phone(raw: &str) -> bool {
    PHONE_REGEX.is_match(&strip_whitespace(raw))
}

/// Validate and normalize a phone number to `258XXXXXXXXX`
///
/// Returns `None` when the number does not match the numbering plan.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact = strip_whitespace(raw);
    if !PHONE_REGEX.is_match(&compact) {
        return None;
    }

    let digits: String = compact.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 9 {
        Some(format!("{}{}", COUNTRY_CODE, digits))
    } else {
        Some(digits)
    }
}

/// Guess the carrier from the number prefix
///
/// Only the prefixes with a single unambiguous carrier are mapped:
/// 82/83 Vodacom, 84/85 M-Pesa, 86/87 e-Mola.
pub fn detect_operator(normalized: &str) -> Option<Operator> {
    let local = normalized.strip_prefix(COUNTRY_CODE).unwrap_or(normalized);
    match local.get(..2)? {
        "82" | "83" => Some(Operator::Vodacom),
        "84" | "85" => Some(Operator::Mpesa),
        "86" | "87" => Some(Operator::Emola),
        _ => None,
    }
}

/// Generate a merchant reference: `INF` + epoch millis + random suffix
pub fn generate_reference() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    let mut reference = format!(
        "{}{}{}",
        REFERENCE_PREFIX,
        Utc::now().timestamp_millis(),
        suffix
    );
    reference.truncate(MAX_REFERENCE_LEN);
    reference
}

/// `validator` custom function for request DTOs
pub fn validate_phone(phone: &str) -> Result<(), validator::ValidationError> {
    if is_valid_phone(phone) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_phone_number"))
    }
}

/// `validator` custom function for client-supplied references
pub fn validate_reference(reference: &str) -> Result<(), validator::ValidationError> {
    let ok = !reference.is_empty()
        && reference.len() <= MAX_REFERENCE_LEN
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_reference"))
    }
}

//! Unverified access-token claims
//!
//! The client never holds the signing key, so claims read here are a hint for
//! scheduling and display only. Authorization is always the server's call.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Payload fields read from a token without checking its signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnverifiedClaims {
    pub subject: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<i64>,
    /// Unix seconds
    pub issued_at: Option<i64>,
    /// Unix seconds
    pub expires_at: Option<i64>,
}

impl UnverifiedClaims {
    pub fn expires_at_time(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Milliseconds from `now` until expiry. Negative once expired.
    pub fn millis_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|exp| exp.saturating_mul(1000).saturating_sub(now.timestamp_millis()))
    }
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// Returns `None` for anything malformed: fewer than three segments, bad
/// base64, or a payload that is not a JSON object.
pub fn decode(token: &str) -> Option<UnverifiedClaims> {
    let mut segments = token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?;

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| STANDARD_LENIENT.decode(payload))
        .or_else(|_| STANDARD.decode(payload))
        .ok()?;

    let object = match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(object) => object,
        _ => return None,
    };

    let subject = object.get("sub").and_then(as_text);
    let nested_user = object.get("user").and_then(Value::as_object);

    let username = object
        .get("username")
        .and_then(as_text)
        .or_else(|| object.get("name").and_then(as_text))
        .or_else(|| nested_user.and_then(|u| u.get("username")).and_then(as_text))
        .or_else(|| subject.clone());

    let user_id = field_id(&object, "userId")
        .or_else(|| field_id(&object, "id"))
        .or_else(|| nested_user.and_then(|u| field_id(u, "id")));

    Some(UnverifiedClaims {
        subject,
        username,
        user_id,
        issued_at: object.get("iat").and_then(as_seconds),
        expires_at: object.get("exp").and_then(as_seconds),
    })
}

/// True when the token decodes and its expiry is still in the future.
pub fn is_valid(token: Option<&str>) -> bool {
    is_valid_at(token, Utc::now())
}

pub fn is_valid_at(token: Option<&str>, now: DateTime<Utc>) -> bool {
    match token.and_then(decode).and_then(|c| c.millis_until_expiry(now)) {
        Some(remaining) => remaining > 0,
        None => false,
    }
}

/// True when the token is missing, undecodable, has no expiry, or expires
/// within `window`.
pub fn is_expiring_soon(token: Option<&str>, window: Duration) -> bool {
    is_expiring_soon_at(token, window, Utc::now())
}

pub fn is_expiring_soon_at(token: Option<&str>, window: Duration, now: DateTime<Utc>) -> bool {
    match token.and_then(decode).and_then(|c| c.millis_until_expiry(now)) {
        Some(remaining) => remaining < window.num_milliseconds(),
        None => true,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_id(object: &Map<String, Value>, key: &str) -> Option<i64> {
    match object.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

//! Structural checks, expiry decoding and minting for bearer credentials.
//!
//! A credential is three non-empty, dot-separated segments. The middle
//! segment is a base64 JSON payload that may carry `exp` (unix seconds) and
//! `sub` (the id of the `users` record it authorizes).

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::{json, Map, Value};

/// URL-safe alphabet that accepts payloads with or without `=` padding.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Length of the random signature segment on minted credentials
const SIGNATURE_LENGTH: usize = 43;

const BEARER_PREFIX: &str = "Bearer ";

/// What the payload says about a credential's lifetime.
///
/// `Unknown` is distinct from `Expired`: a payload we cannot decode is
/// treated as live so a change to the token body cannot lock users out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Carries an `exp` in the future
    Active(DateTime<Utc>),
    /// Carries an `exp` at or before now
    Expired(DateTime<Utc>),
    /// Payload decoded but has no numeric `exp`
    Unbounded,
    /// Payload could not be decoded
    Unknown,
}

impl Expiry {
    pub fn is_expired(&self) -> bool {
        matches!(self, Expiry::Expired(_))
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Active(at) | Expiry::Expired(at) => Some(*at),
            Expiry::Unbounded | Expiry::Unknown => None,
        }
    }
}

/// Strip surrounding quotes, backslashes, whitespace and a `Bearer ` prefix.
///
/// Quotes nested any number of levels deep (`"\"a.b.c\""`) collapse to the
/// bare value.
pub fn sanitize(raw: &str) -> String {
    let mut value = trim_delimiters(raw);
    while value
        .get(..BEARER_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(BEARER_PREFIX))
    {
        value = trim_delimiters(&value[BEARER_PREFIX.len()..]);
    }
    value.to_string()
}

fn trim_delimiters(value: &str) -> &str {
    value.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '\\')
}

/// Three non-empty dot-separated segments with no whitespace.
pub fn is_well_formed(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments
            .iter()
            .all(|s| !s.is_empty() && !s.chars().any(char::is_whitespace))
}

/// Decode the JSON object carried in the middle segment.
pub fn decode_payload(token: &str) -> Option<Map<String, Value>> {
    let segment = token.split('.').nth(1)?;
    // Tolerate the standard alphabet as well as the URL-safe one
    let normalized: String = segment
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = SEGMENT_ENGINE.decode(normalized.as_bytes()).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Evaluate the credential's `exp` claim against `now`.
pub fn expiry_at(token: &str, now: DateTime<Utc>) -> Expiry {
    let Some(payload) = decode_payload(token) else {
        return Expiry::Unknown;
    };
    let Some(exp) = payload.get("exp").and_then(timestamp_from_value) else {
        return Expiry::Unbounded;
    };
    if exp <= now {
        Expiry::Expired(exp)
    } else {
        Expiry::Active(exp)
    }
}

pub fn expiry(token: &str) -> Expiry {
    expiry_at(token, Utc::now())
}

/// Numeric `exp` as an instant. Values beyond the representable range clamp
/// to its ends, so a far-past expiry still reads as expired.
fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = value.as_i64() {
        return Some(DateTime::from_timestamp(secs, 0).unwrap_or(clamped(secs < 0)));
    }
    let secs = value.as_f64()?;
    if secs.is_nan() {
        return None;
    }
    // `as` saturates, including for infinities
    let millis = (secs * 1000.0) as i64;
    Some(DateTime::from_timestamp_millis(millis).unwrap_or(clamped(secs < 0.0)))
}

fn clamped(past: bool) -> DateTime<Utc> {
    if past {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    }
}

/// Record id named by the `sub` claim (number or numeric string).
pub fn subject(token: &str) -> Option<u64> {
    match decode_payload(token)?.get("sub")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Mint an unsigned credential for `subject`, valid for `ttl` from `issued_at`.
///
/// When the expiry would fall outside the representable range the credential
/// is minted without `exp`.
pub fn mint(subject: u64, issued_at: DateTime<Utc>, ttl: Duration) -> String {
    let header = json!({ "alg": "none", "typ": "JWT" });
    let mut payload = Map::new();
    payload.insert("sub".to_string(), json!(subject));
    payload.insert("iat".to_string(), json!(issued_at.timestamp()));
    if let Some(expires_at) = issued_at.checked_add_signed(ttl) {
        payload.insert("exp".to_string(), json!(expires_at.timestamp()));
    }
    let payload = Value::Object(payload);
    let signature: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SIGNATURE_LENGTH)
        .map(char::from)
        .collect();

    format!(
        "{}.{}.{}",
        SEGMENT_ENGINE.encode(header.to_string()),
        SEGMENT_ENGINE.encode(payload.to_string()),
        signature
    )
}

/// Build a credential around an arbitrary payload. Used by tests and tools
/// that need tokens with specific claims.
pub fn with_payload(payload: &Value) -> String {
    format!(
        "{}.{}.sig",
        SEGMENT_ENGINE.encode(r#"{"alg":"none"}"#),
        SEGMENT_ENGINE.encode(payload.to_string())
    )
}

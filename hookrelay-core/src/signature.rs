use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::HmacMode;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("endpoint has no secret configured")]
    MissingSecret,
    #[error("timestamp outside replay window")]
    TimestampOutOfRange,
    #[error("signature does not match")]
    SignatureMismatch,
}

/// Incoming headers relevant to signature verification, already
/// lower-cased by the caller's extraction layer.
#[derive(Debug, Clone, Default)]
pub struct SignatureHeaders<'a> {
    pub stripe_signature: Option<&'a str>,
    pub github_signature: Option<&'a str>,
    pub generic_signature: Option<&'a str>,
    pub generic_timestamp: Option<&'a str>,
}

fn hmac_hex(secret: &str, signing_string: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signing_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Parses `Stripe-Signature`'s comma-separated `k=v` pairs, returning the
/// timestamp and every `v1` value present.
fn parse_stripe_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut v1s = Vec::new();
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim();
        let value = kv.next().unwrap_or("").trim();
        if value.is_empty() {
            continue;
        }
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => v1s.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if v1s.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    Ok((timestamp, v1s))
}

/// Verifies an inbound webhook's signature per the endpoint's configured
/// [`HmacMode`]. `now_sec` and `replay_window_sec` gate timestamped modes
/// against replay; `mode: HmacMode::None` always succeeds regardless of
/// headers or secret.
pub fn verify_signature(
    mode: HmacMode,
    secret: Option<&str>,
    raw_body: &str,
    headers: &SignatureHeaders,
    now_sec: i64,
    replay_window_sec: i64,
) -> Result<(), SignatureError> {
    if mode == HmacMode::None {
        return Ok(());
    }
    let secret = secret.ok_or(SignatureError::MissingSecret)?;

    match mode {
        HmacMode::None => unreachable!(),
        HmacMode::Stripe => {
            let header = headers
                .stripe_signature
                .ok_or(SignatureError::MissingHeader)?;
            let (timestamp, v1s) = parse_stripe_header(header)?;
            if (now_sec - timestamp).abs() > replay_window_sec {
                return Err(SignatureError::TimestampOutOfRange);
            }
            let signing_string = format!("{}.{}", timestamp, raw_body);
            let expected = hmac_hex(secret, &signing_string);
            if v1s.iter().any(|v1| constant_time_eq(v1, &expected)) {
                Ok(())
            } else {
                Err(SignatureError::SignatureMismatch)
            }
        }
        HmacMode::Github => {
            let header = headers
                .github_signature
                .ok_or(SignatureError::MissingHeader)?;
            let provided = header.strip_prefix("sha256=").unwrap_or(header);
            let expected = hmac_hex(secret, raw_body);
            if constant_time_eq(provided, &expected) {
                Ok(())
            } else {
                Err(SignatureError::SignatureMismatch)
            }
        }
        HmacMode::Generic => {
            let provided = headers
                .generic_signature
                .ok_or(SignatureError::MissingHeader)?;
            let signing_string = match headers.generic_timestamp {
                Some(ts) => {
                    let timestamp = ts.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?;
                    if (now_sec - timestamp).abs() > replay_window_sec {
                        return Err(SignatureError::TimestampOutOfRange);
                    }
                    format!("{}.{}", timestamp, raw_body)
                }
                None => raw_body.to_string(),
            };
            let expected = hmac_hex(secret, &signing_string);
            if constant_time_eq(provided, &expected) {
                Ok(())
            } else {
                Err(SignatureError::SignatureMismatch)
            }
        }
    }
}

/// Builds a `Stripe-Signature` header value for a synthetic request, used
/// by the operator `testEndpoint` procedure to exercise the full signing
/// contract rather than bare reachability.
pub fn sign_stripe(secret: &str, raw_body: &str, timestamp: i64) -> String {
    let signing_string = format!("{}.{}", timestamp, raw_body);
    format!("t={},v1={}", timestamp, hmac_hex(secret, &signing_string))
}

pub fn sign_github(secret: &str, raw_body: &str) -> String {
    format!("sha256={}", hmac_hex(secret, raw_body))
}

pub fn sign_generic(secret: &str, raw_body: &str, timestamp: Option<i64>) -> String {
    match timestamp {
        Some(ts) => hmac_hex(secret, &format!("{}.{}", ts, raw_body)),
        None => hmac_hex(secret, raw_body),
    }
}

//! Mapping of Discord HTTP failures onto [`UpstreamError`].
//!
//! # Overview
//!
//! | Response | Mapped to |
//! |----------|-----------|
//! | 429 | `RateLimited { kind: Generic }`, hint from body `retry_after` and the `retry-after` header |
//! | 400 form error `USERNAME_RATE_LIMIT` / `AVATAR_RATE_LIMIT` | `RateLimited { kind: IdentityChange }` |
//! | 400 form error `USERNAME_ALREADY_TAKEN` / `USERNAME_INVALID_TAKEN` | `IdentityUnavailable` |
//! | any other non-2xx | `Http { status, code }` |
//! | timeout / DNS / reset while sending | `TransientNetwork` |

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde_json::Value;

use guildhall_core::{IdentityField, NetworkFailure, RateLimitKind, UpstreamError};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    code: Option<u64>,
    message: Option<String>,
    retry_after: Option<f64>,
    global: Option<bool>,
    errors: Option<Value>,
}

/// Form-error codes that mean "you changed this too often".
const IDENTITY_RATE_LIMIT_CODES: &[&str] = &["USERNAME_RATE_LIMIT", "AVATAR_RATE_LIMIT"];
/// Form-error codes that mean "this value cannot be used".
const IDENTITY_TAKEN_CODES: &[&str] = &["USERNAME_ALREADY_TAKEN", "USERNAME_INVALID_TAKEN"];

/// Parses a `retry-after` header value in (possibly fractional) seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(secs)
}

fn secs(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

/// Maps a non-success response onto the error taxonomy.
pub fn map_response(status: u16, headers: &HeaderMap, body: &[u8]) -> UpstreamError {
    let header_retry_after = parse_retry_after(headers);
    let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                format!("HTTP {status}")
            } else {
                text
            }
        });
    let body = parsed.unwrap_or_default();

    if status == 429 {
        let message = if body.global == Some(true) {
            format!("{message} (global)")
        } else {
            message
        };
        return UpstreamError::RateLimited {
            status,
            kind: RateLimitKind::Generic,
            retry_after: body.retry_after.and_then(secs),
            header_retry_after,
            message,
        };
    }

    if let Some((field, code)) = body.errors.as_ref().and_then(find_identity_error) {
        if IDENTITY_RATE_LIMIT_CODES.contains(&code.as_str()) {
            return UpstreamError::RateLimited {
                status,
                kind: RateLimitKind::IdentityChange,
                retry_after: body.retry_after.and_then(secs),
                header_retry_after,
                message,
            };
        }
        return UpstreamError::IdentityUnavailable {
            status,
            field,
            message,
        };
    }

    UpstreamError::Http {
        status,
        code: body.code,
        message,
    }
}

/// Looks for an identity-related form error under `errors.username` or
/// `errors.avatar`.
fn find_identity_error(errors: &Value) -> Option<(IdentityField, String)> {
    [
        ("username", IdentityField::Username),
        ("avatar", IdentityField::Avatar),
    ]
    .into_iter()
    .find_map(|(key, field)| {
        errors
            .get(key)?
            .get("_errors")?
            .as_array()?
            .iter()
            .filter_map(|e| e.get("code").and_then(Value::as_str))
            .find(|code| {
                IDENTITY_RATE_LIMIT_CODES.contains(code) || IDENTITY_TAKEN_CODES.contains(code)
            })
            .map(|code| (field, code.to_string()))
    })
}

/// Maps a failure to send a request or read its response.
pub fn map_transport(err: &reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        return UpstreamError::network(NetworkFailure::Timeout, err.to_string());
    }
    if err.is_decode() {
        return UpstreamError::protocol(err.to_string());
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => {
                    return UpstreamError::network(NetworkFailure::ConnectionReset, err.to_string());
                }
                io::ErrorKind::TimedOut => {
                    return UpstreamError::network(NetworkFailure::Timeout, err.to_string());
                }
                _ => {}
            }
        }
        let text = cause.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return UpstreamError::network(NetworkFailure::Dns, err.to_string());
        }
        source = cause.source();
    }

    if err.is_connect() || err.is_request() {
        return UpstreamError::network(NetworkFailure::ConnectionReset, err.to_string());
    }
    UpstreamError::protocol(err.to_string())
}

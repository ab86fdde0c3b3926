//! Dashboard error responses.
//!
//! Every failure leaving a handler becomes an [`ErrorBody`] with a status
//! chosen from the error class:
//!
//! | Error | Status | Code |
//! |-------|--------|------|
//! | `RateLimited` | 429 | `rate_limited` (+ `retryAfterMs`) |
//! | `IdentityUnavailable` | 409 | `identity_unavailable` |
//! | `SizeExceeded` | 413 | `size_exceeded` |
//! | `Timeout` | 504 | `timeout` |
//! | `TransientNetwork`, upstream 5xx, `Cancelled` | 502 / 503 | `upstream_unavailable` |
//! | upstream 403 / 404 | 403 / 404 | `forbidden` / `not_found` |
//! | other upstream 4xx | 400 | `upstream_rejected` |
//! | bad request body | 400 | `invalid_request` |
//! | anything else | 500 | `internal` (generic message, raw text in `detail`) |

use std::io;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use guildhall_core::api::codes;
use guildhall_core::{
    ErrorBody, GENERIC_ERROR_MESSAGE, RateLimitClassifier, UpstreamError,
};
use guildhall_media::MediaError;

/// Errors produced while serving a dashboard request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A rate limit with its cooldown resolved by the serving classifier.
    #[error("{error}")]
    RateLimited {
        error: UpstreamError,
        retry_after: Option<Duration>,
    },

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl ApiError {
    /// Wraps an upstream failure, resolving rate-limit cooldowns with the
    /// classifier that drove the retries.
    pub fn upstream(error: UpstreamError, classifier: &RateLimitClassifier) -> Self {
        if matches!(error, UpstreamError::RateLimited { .. }) {
            let retry_after = classifier.classify(&error).retry_after;
            Self::RateLimited { error, retry_after }
        } else {
            Self::Upstream(error)
        }
    }

    /// Status code and body sent to the dashboard.
    pub fn to_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            Self::Upstream(err) => upstream_body(err, None),
            Self::RateLimited { error, retry_after } => upstream_body(error, *retry_after),
            Self::Media(MediaError::SizeExceeded { .. }) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody::new(codes::SIZE_EXCEEDED, self.to_string()),
            ),
            Self::Media(MediaError::Decode(_) | MediaError::InvalidEncoding(_)) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(codes::INVALID_REQUEST, self.to_string()),
            ),
            Self::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(codes::INVALID_REQUEST, message.clone()),
            ),
            Self::Media(_) | Self::Internal(_) => internal(self.to_string()),
        }
    }
}

/// `resolved` is the classifier's cooldown; without one only the hints the
/// upstream sent are reported.
fn upstream_body(err: &UpstreamError, resolved: Option<Duration>) -> (StatusCode, ErrorBody) {
    let message = err.to_string();
    match err {
        UpstreamError::RateLimited {
            retry_after,
            header_retry_after,
            ..
        } => {
            let mut body = ErrorBody::new(codes::RATE_LIMITED, message);
            if let Some(wait) = resolved.or(*retry_after).or(*header_retry_after) {
                body = body.with_retry_after_ms(u64::try_from(wait.as_millis()).unwrap_or(u64::MAX));
            }
            (StatusCode::TOO_MANY_REQUESTS, body)
        }
        UpstreamError::IdentityUnavailable { .. } => (
            StatusCode::CONFLICT,
            ErrorBody::new(codes::IDENTITY_UNAVAILABLE, message),
        ),
        UpstreamError::Timeout { .. } => (
            StatusCode::GATEWAY_TIMEOUT,
            ErrorBody::new(codes::TIMEOUT, message),
        ),
        UpstreamError::TransientNetwork { .. } => (
            StatusCode::BAD_GATEWAY,
            ErrorBody::new(codes::UPSTREAM_UNAVAILABLE, message),
        ),
        UpstreamError::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorBody::new(codes::UPSTREAM_UNAVAILABLE, message),
        ),
        UpstreamError::Http { status, .. } => match *status {
            403 => (
                StatusCode::FORBIDDEN,
                ErrorBody::new(codes::FORBIDDEN, message),
            ),
            404 => (
                StatusCode::NOT_FOUND,
                ErrorBody::new(codes::NOT_FOUND, message),
            ),
            400..=499 => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(codes::UPSTREAM_REJECTED, message),
            ),
            500..=599 => (
                StatusCode::BAD_GATEWAY,
                ErrorBody::new(codes::UPSTREAM_UNAVAILABLE, message),
            ),
            _ => internal(message),
        },
        UpstreamError::Protocol(_) => internal(message),
    }
}

fn internal(detail: String) -> (StatusCode, ErrorBody) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody::new(codes::INTERNAL, GENERIC_ERROR_MESSAGE).with_detail(detail),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_body();
        if status.is_server_error() {
            error!(status = status.as_u16(), code = %body.code, error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), code = %body.code, error = %self, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}

/// Errors starting or running the dashboard server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildhall_core::{IdentityField, NetworkFailure, RateLimitKind};

    fn status_and_code(err: impl Into<ApiError>) -> (u16, String) {
        let (status, body) = err.into().to_body();
        (status.as_u16(), body.code)
    }

    fn identity_change_limit() -> UpstreamError {
        UpstreamError::RateLimited {
            status: 400,
            kind: RateLimitKind::IdentityChange,
            retry_after: None,
            header_retry_after: None,
            message: "changing username too fast".into(),
        }
    }

    #[test]
    fn rate_limit_carries_resolved_retry_hint() {
        let err = ApiError::upstream(identity_change_limit(), &RateLimitClassifier::default());
        let (status, body) = err.to_body();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.retry_after_ms, Some(30 * 60 * 1000));

        let err = ApiError::from(UpstreamError::RateLimited {
            status: 429,
            kind: RateLimitKind::Generic,
            retry_after: Some(Duration::from_millis(1200)),
            header_retry_after: None,
            message: "slow down".into(),
        });
        assert_eq!(err.to_body().1.retry_after_ms, Some(1200));
    }

    #[test]
    fn rate_limit_hint_follows_configured_cooldowns() {
        let classifier =
            RateLimitClassifier::new(Duration::from_secs(2), Duration::from_secs(90));
        let err = ApiError::upstream(identity_change_limit(), &classifier);
        let (status, body) = err.to_body();
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.code, codes::RATE_LIMITED);
        assert_eq!(body.retry_after_ms, Some(90_000));
    }

    #[test]
    fn non_rate_limit_errors_skip_resolution() {
        let err = ApiError::upstream(
            UpstreamError::http(404, "Unknown Guild"),
            &RateLimitClassifier::default(),
        );
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[test]
    fn terminal_classes_map_to_distinct_statuses() {
        assert_eq!(
            status_and_code(UpstreamError::IdentityUnavailable {
                status: 400,
                field: IdentityField::Username,
                message: "taken".into(),
            }),
            (409, "identity_unavailable".into())
        );
        assert_eq!(
            status_and_code(MediaError::SizeExceeded {
                target: 1024,
                smallest: 4096,
            }),
            (413, "size_exceeded".into())
        );
        assert_eq!(
            status_and_code(UpstreamError::Timeout {
                message: "took too long".into()
            }),
            (504, "timeout".into())
        );
        assert_eq!(
            status_and_code(UpstreamError::network(NetworkFailure::Dns, "lookup failed")),
            (502, "upstream_unavailable".into())
        );
        assert_eq!(
            status_and_code(UpstreamError::http(403, "Missing Access")),
            (403, "forbidden".into())
        );
        assert_eq!(
            status_and_code(UpstreamError::http(400, "Cannot send an empty message")),
            (400, "upstream_rejected".into())
        );
    }

    #[test]
    fn unclassified_errors_use_generic_message() {
        let (status, body) = ApiError::from(UpstreamError::protocol("unexpected token")).to_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, GENERIC_ERROR_MESSAGE);
        assert!(body.detail.unwrap().contains("unexpected token"));
    }
}

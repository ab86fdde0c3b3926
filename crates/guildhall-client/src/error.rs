//! Client-side error types.

use std::time::Duration;

use thiserror::Error;

use guildhall_core::ErrorBody;
use guildhall_core::api::codes;

/// Errors returned by the dashboard client SDK.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The dashboard answered with a structured error body.
    #[error("dashboard error {status} ({}): {}", body.code, body.message)]
    Api { status: u16, body: ErrorBody },

    /// The request never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push channel error: {0}")]
    Push(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid dashboard URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ClientError {
    /// Machine-readable code of an API error.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { body, .. } => Some(&body.code),
            _ => None,
        }
    }

    /// Suggested wait before retrying, if the dashboard sent one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { body, .. } => body.retry_after_ms.map(Duration::from_millis),
            _ => None,
        }
    }

    /// Returns `true` for the forbidden / not-found classes that mean the bot
    /// is not a member of the guild.
    pub fn is_absence(&self) -> bool {
        match self {
            Self::Api { status, body } => {
                matches!(*status, 403 | 404)
                    || body.code == codes::FORBIDDEN
                    || body.code == codes::NOT_FOUND
            }
            _ => false,
        }
    }

    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Api { body, .. } => &body.message,
            _ => guildhall_core::GENERIC_ERROR_MESSAGE,
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: &str) -> ClientError {
        ClientError::Api {
            status,
            body: ErrorBody::new(code, "nope"),
        }
    }

    #[test]
    fn absence_covers_forbidden_and_not_found() {
        assert!(api(403, codes::FORBIDDEN).is_absence());
        assert!(api(404, codes::NOT_FOUND).is_absence());
        assert!(!api(429, codes::RATE_LIMITED).is_absence());
        assert!(!api(502, codes::UPSTREAM_REJECTED).is_absence());
    }

    #[test]
    fn retry_after_comes_from_body() {
        let err = ClientError::Api {
            status: 429,
            body: ErrorBody::new(codes::RATE_LIMITED, "slow down").with_retry_after_ms(2500),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(2500)));
        assert_eq!(err.code(), Some(codes::RATE_LIMITED));
        assert_eq!(err.user_message(), "slow down");
    }

    #[test]
    fn non_api_errors_show_generic_message() {
        let err = ClientError::InvalidUrl {
            url: "ftp://x".into(),
            reason: "unsupported scheme".into(),
        };
        assert_eq!(err.user_message(), guildhall_core::GENERIC_ERROR_MESSAGE);
        assert!(err.code().is_none());
    }
}

//! Unified upstream error taxonomy.
//!
//! Every call into the chat platform resolves to an [`UpstreamError`] on
//! failure. The variants are a closed set so that retry classification and
//! dashboard rendering are exhaustive `match`es rather than string probes.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Error subtypes
// =============================================================================

/// The network-level failure classes that are always worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    /// The peer reset or refused the connection.
    ConnectionReset,
    /// The request did not complete in time at the transport level.
    Timeout,
    /// Host name resolution failed.
    Dns,
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConnectionReset => "connection reset",
            Self::Timeout => "network timeout",
            Self::Dns => "dns resolution failed",
        })
    }
}

/// Which kind of throttle the platform applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    /// Ordinary per-route or global request throttling.
    Generic,
    /// The bot changed its name or avatar too often; the platform holds a
    /// long-lived lock on further identity changes.
    IdentityChange,
}

/// The identity attribute a profile update tried to claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    /// Bot username.
    Username,
    /// Bot avatar.
    Avatar,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Username => "username",
            Self::Avatar => "avatar",
        })
    }
}

// =============================================================================
// UpstreamError
// =============================================================================

/// Errors raised by calls to the upstream chat platform.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Connection reset, transport timeout or DNS failure.
    #[error("transient network error ({failure}): {message}")]
    TransientNetwork {
        /// Failure class.
        failure: NetworkFailure,
        /// Underlying error text.
        message: String,
    },

    /// The platform throttled the request.
    #[error("rate limited ({status}): {message}")]
    RateLimited {
        /// HTTP status the throttle arrived with (429, or 400 for identity locks).
        status: u16,
        /// Throttle category.
        kind: RateLimitKind,
        /// Machine-readable retry value from the response body.
        retry_after: Option<Duration>,
        /// Value of the `retry-after` response header.
        header_retry_after: Option<Duration>,
        /// Platform message.
        message: String,
    },

    /// The requested identity value cannot be used (for example a taken name).
    #[error("{field} unavailable: {message}")]
    IdentityUnavailable {
        /// HTTP status the rejection arrived with.
        status: u16,
        /// Which attribute was rejected.
        field: IdentityField,
        /// Platform message.
        message: String,
    },

    /// Any other non-success response. Terminal.
    #[error("upstream rejected request ({status}): {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Platform-specific error code, if the body carried one.
        code: Option<u64>,
        /// Platform message.
        message: String,
    },

    /// An operation exceeded its time bound.
    #[error("{message}")]
    Timeout {
        /// Caller-supplied description of what timed out.
        message: String,
    },

    /// The operation observed its cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// The upstream answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl UpstreamError {
    /// Creates a transient network error.
    pub fn network(failure: NetworkFailure, message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            failure,
            message: message.into(),
        }
    }

    /// Creates a terminal HTTP error without a platform code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the HTTP status this error arrived with, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. }
            | Self::IdentityUnavailable { status, .. }
            | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for the forbidden / not-found responses that mean the
    /// bot is not a member of the addressed guild.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::Http { status: 403 | 404, .. })
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Result type for upstream calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

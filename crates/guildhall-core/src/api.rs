//! JSON bodies exchanged between the dashboard server and its clients.
//!
//! Domain types such as [`ChatMessage`](crate::ChatMessage) travel as-is; the
//! types here only exist on the dashboard boundary.

use serde::{Deserialize, Serialize};

use crate::model::GuildSummary;

/// Machine-readable error codes carried in [`ErrorBody::code`].
pub mod codes {
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const IDENTITY_UNAVAILABLE: &str = "identity_unavailable";
    pub const SIZE_EXCEEDED: &str = "size_exceeded";
    pub const TIMEOUT: &str = "timeout";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const UPSTREAM_REJECTED: &str = "upstream_rejected";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INTERNAL: &str = "internal";
}

/// Message shown for errors that have no classification.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred, please retry.";

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    /// Suggested wait before retrying, for rate limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Raw diagnostic text, only for unclassified errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
            detail: None,
        }
    }

    pub fn with_retry_after_ms(mut self, millis: u64) -> Self {
        self.retry_after_ms = Some(millis);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Answer of a membership probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildPresence {
    pub present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild: Option<GuildSummary>,
}

impl GuildPresence {
    pub fn present(guild: GuildSummary) -> Self {
        Self {
            present: true,
            guild: Some(guild),
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            guild: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteLink {
    pub url: String,
}

/// Body of `PATCH /bot/profile`.
///
/// `avatar` is base64, either raw or as a `data:` URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

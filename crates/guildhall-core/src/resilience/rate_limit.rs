//! Retryability and cooldown classification of upstream errors.

use std::time::Duration;

use crate::error::{RateLimitKind, UpstreamError};

/// Cooldown applied to an ordinary throttle that carries no hint.
pub const GENERIC_COOLDOWN: Duration = Duration::from_secs(5);

/// Cooldown applied to a repeated name/avatar change.
///
/// The platform holds these locks for a long time; retrying sooner only
/// extends the lock.
pub const IDENTITY_CHANGE_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Outcome of classifying one error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether another attempt may succeed.
    pub retryable: bool,
    /// Minimum wait before the next attempt, when the error prescribes one.
    pub retry_after: Option<Duration>,
    /// Why the error is terminal, when it is.
    pub terminal_reason: Option<String>,
}

impl RateLimitDecision {
    fn retry() -> Self {
        Self {
            retryable: true,
            retry_after: None,
            terminal_reason: None,
        }
    }

    fn retry_after(delay: Duration) -> Self {
        Self {
            retryable: true,
            retry_after: Some(delay),
            terminal_reason: None,
        }
    }

    fn terminal(reason: impl Into<String>) -> Self {
        Self {
            retryable: false,
            retry_after: None,
            terminal_reason: Some(reason.into()),
        }
    }
}

/// Decides whether an [`UpstreamError`] is worth retrying and for how long
/// to back off.
///
/// Classification goes by variant, never by status code: a 400 can be an
/// identity-change throttle (retryable after a long cooldown) or a taken
/// username (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitClassifier {
    generic_cooldown: Duration,
    identity_change_cooldown: Duration,
}

impl RateLimitClassifier {
    pub fn new(generic_cooldown: Duration, identity_change_cooldown: Duration) -> Self {
        Self {
            generic_cooldown,
            identity_change_cooldown,
        }
    }

    /// Classifies one error.
    pub fn classify(&self, error: &UpstreamError) -> RateLimitDecision {
        match error {
            UpstreamError::TransientNetwork { .. } | UpstreamError::Timeout { .. } => {
                RateLimitDecision::retry()
            }
            UpstreamError::RateLimited {
                kind,
                retry_after,
                header_retry_after,
                ..
            } => RateLimitDecision::retry_after(
                retry_after
                    .or(*header_retry_after)
                    .unwrap_or_else(|| self.default_cooldown(*kind)),
            ),
            UpstreamError::IdentityUnavailable { field, .. } => {
                RateLimitDecision::terminal(format!("{field} is unavailable"))
            }
            UpstreamError::Http { status, .. } => {
                RateLimitDecision::terminal(format!("upstream rejected the request ({status})"))
            }
            UpstreamError::Cancelled => RateLimitDecision::terminal("operation cancelled"),
            UpstreamError::Protocol(_) => {
                RateLimitDecision::terminal("upstream sent an unreadable response")
            }
        }
    }

    fn default_cooldown(&self, kind: RateLimitKind) -> Duration {
        match kind {
            RateLimitKind::Generic => self.generic_cooldown,
            RateLimitKind::IdentityChange => self.identity_change_cooldown,
        }
    }
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self::new(GENERIC_COOLDOWN, IDENTITY_CHANGE_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IdentityField, NetworkFailure};

    fn limited(kind: RateLimitKind, body: Option<u64>, header: Option<u64>) -> UpstreamError {
        UpstreamError::RateLimited {
            status: if kind == RateLimitKind::IdentityChange { 400 } else { 429 },
            kind,
            retry_after: body.map(Duration::from_millis),
            header_retry_after: header.map(Duration::from_millis),
            message: "You are being rate limited.".into(),
        }
    }

    #[test]
    fn network_failures_are_retryable_without_hint() {
        let classifier = RateLimitClassifier::default();
        for failure in [
            NetworkFailure::ConnectionReset,
            NetworkFailure::Timeout,
            NetworkFailure::Dns,
        ] {
            let decision = classifier.classify(&UpstreamError::network(failure, "boom"));
            assert!(decision.retryable);
            assert_eq!(decision.retry_after, None);
        }
    }

    #[test]
    fn generic_throttle_without_hint_uses_generic_default() {
        let decision =
            RateLimitClassifier::default().classify(&limited(RateLimitKind::Generic, None, None));
        assert!(decision.retryable);
        assert_eq!(decision.retry_after, Some(GENERIC_COOLDOWN));
    }

    #[test]
    fn identity_change_throttle_uses_longer_default() {
        let decision = RateLimitClassifier::default()
            .classify(&limited(RateLimitKind::IdentityChange, None, None));
        assert_eq!(decision.retry_after, Some(IDENTITY_CHANGE_COOLDOWN));
        assert!(IDENTITY_CHANGE_COOLDOWN > GENERIC_COOLDOWN);
    }

    #[test]
    fn explicit_hint_beats_header_beats_default() {
        let classifier = RateLimitClassifier::default();
        let both = classifier.classify(&limited(RateLimitKind::Generic, Some(1_500), Some(3_000)));
        assert_eq!(both.retry_after, Some(Duration::from_millis(1_500)));

        let header_only = classifier.classify(&limited(
            RateLimitKind::IdentityChange,
            None,
            Some(3_000),
        ));
        assert_eq!(header_only.retry_after, Some(Duration::from_millis(3_000)));
    }

    #[test]
    fn identity_unavailable_is_terminal_despite_shared_status() {
        let classifier = RateLimitClassifier::default();
        let taken = UpstreamError::IdentityUnavailable {
            status: 400,
            field: IdentityField::Username,
            message: "Username is already taken".into(),
        };
        let throttled = limited(RateLimitKind::IdentityChange, None, None);
        assert_eq!(taken.status(), throttled.status());

        let decision = classifier.classify(&taken);
        assert!(!decision.retryable);
        assert_eq!(decision.terminal_reason.as_deref(), Some("username is unavailable"));
        assert!(classifier.classify(&throttled).retryable);
    }

    #[test]
    fn server_errors_are_not_retried() {
        let decision = RateLimitClassifier::default().classify(&UpstreamError::http(503, "down"));
        assert!(!decision.retryable);
    }
}

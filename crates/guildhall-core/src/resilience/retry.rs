//! Retry executor.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backoff::RetryPolicy;
use super::rate_limit::RateLimitClassifier;
use crate::error::{UpstreamError, UpstreamResult};

/// Observation passed to the retry callback before each backoff sleep.
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    /// Total attempts the policy allows.
    pub max_attempts: u32,
    /// How long the executor will wait before the next attempt.
    pub delay: Duration,
    /// The failure that triggered the retry.
    pub error: &'a UpstreamError,
}

/// Runs an operation, retrying failures the [`RateLimitClassifier`] deems
/// transient.
///
/// Retried operations may execute more than once; callers whose operations
/// have side effects are responsible for making them idempotent.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    classifier: RateLimitClassifier,
    cancel: Option<CancellationToken>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            classifier: RateLimitClassifier::default(),
            cancel: None,
        }
    }

    pub fn with_classifier(mut self, classifier: RateLimitClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Makes backoff sleeps interruptible. Cancelling the token ends the
    /// sequence with the last error instead of waiting out the delay.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &RateLimitClassifier {
        &self.classifier
    }

    /// Runs `op` until it succeeds, fails terminally or exhausts the policy.
    pub async fn execute<F, Fut, T>(&self, op: F) -> UpstreamResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        self.execute_with(op, |_| {}).await
    }

    /// Like [`execute`](Self::execute), invoking `on_retry` before each
    /// backoff sleep.
    pub async fn execute_with<F, Fut, T, R>(&self, mut op: F, mut on_retry: R) -> UpstreamResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
        R: FnMut(&RetryNotice<'_>),
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            let error = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if attempt >= max_attempts {
                warn!(attempt, max_attempts, error = %error, "retry attempts exhausted");
                return Err(error);
            }

            let decision = self.classifier.classify(&error);
            if !decision.retryable {
                debug!(
                    attempt,
                    reason = decision.terminal_reason.as_deref().unwrap_or("terminal"),
                    "not retrying terminal error"
                );
                return Err(error);
            }

            let mut delay = self.policy.delay_for_attempt(attempt);
            if let Some(hint) = decision.retry_after {
                if hint > self.policy.max_delay() {
                    warn!(
                        retry_after_ms = hint.as_millis() as u64,
                        max_delay_ms = self.policy.max_delay().as_millis() as u64,
                        "cooldown exceeds retry budget, surfacing to caller"
                    );
                    return Err(error);
                }
                delay = delay.max(hint);
            }

            on_retry(&RetryNotice {
                attempt,
                max_attempts,
                delay,
                error: &error,
            });
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "upstream call failed, retrying"
            );

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(attempt, "retry backoff cancelled");
                            return Err(error);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            attempt += 1;
        }
    }
}

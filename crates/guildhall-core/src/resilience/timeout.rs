//! Time bounds for upstream operations.

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{UpstreamError, UpstreamResult};

/// Bounds an operation's duration and turns an overrun into
/// [`UpstreamError::Timeout`].
///
/// The wrapped operation receives a [`CancellationToken`] that is cancelled
/// when the bound elapses, when the guard's future is dropped, or when the
/// optional parent token is cancelled.
#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    timeout: Duration,
    message: String,
    parent: Option<CancellationToken>,
}

impl TimeoutGuard {
    /// Creates a guard with a default timeout message.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            message: format!("operation timed out after {}ms", timeout.as_millis()),
            parent: None,
        }
    }

    /// Sets the message carried by the resulting timeout error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Links the operation's token to a parent (typically the shutdown token).
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `op` under the bound.
    pub async fn run<F, Fut, T>(&self, op: F) -> UpstreamResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let _release = token.clone().drop_guard();

        let op = op(token.clone());
        tokio::pin!(op);

        tokio::select! {
            biased;
            result = &mut op => result,
            _ = tokio::time::sleep(self.timeout) => {
                token.cancel();
                // Give the operation one poll to observe the cancellation.
                match op.as_mut().now_or_never() {
                    Some(Err(UpstreamError::Cancelled)) | None => {
                        debug!(timeout_ms = self.timeout.as_millis() as u64, "operation timed out");
                        Err(UpstreamError::Timeout {
                            message: self.message.clone(),
                        })
                    }
                    Some(settled) => settled,
                }
            }
        }
    }
}

/// Convenience wrapper around [`TimeoutGuard`].
pub async fn with_timeout<F, Fut, T>(
    timeout: Duration,
    message: impl Into<String>,
    op: F,
) -> UpstreamResult<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = UpstreamResult<T>>,
{
    TimeoutGuard::new(timeout).with_message(message).run(op).await
}

/// Races `fut` against `token`, yielding [`UpstreamError::Cancelled`] if the
/// token fires first.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> UpstreamResult<T>
where
    F: Future<Output = UpstreamResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(UpstreamError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fast_operation_passes_through() {
        let result = with_timeout(Duration::from_secs(1), "slow", |_| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, UpstreamError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn overrun_becomes_timeout_with_message() {
        let observed = Arc::new(AtomicBool::new(false));
        let flag = observed.clone();
        let result: UpstreamResult<()> =
            with_timeout(Duration::from_millis(100), "channel fetch timed out", |token| {
                async move {
                    let outcome = cancellable(&token, async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    })
                    .await;
                    flag.store(matches!(outcome, Err(UpstreamError::Cancelled)), Ordering::SeqCst);
                    outcome
                }
            })
            .await;

        match result {
            Err(UpstreamError::Timeout { message }) => {
                assert_eq!(message, "channel fetch timed out")
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(observed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn operation_ignoring_token_still_times_out() {
        let result: UpstreamResult<()> = with_timeout(Duration::from_millis(50), "stuck", |_| {
            futures::future::pending()
        })
        .await;
        assert!(matches!(result, Err(UpstreamError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_released_on_success() {
        let mut captured = None;
        let result = TimeoutGuard::new(Duration::from_secs(1))
            .run(|token| {
                captured = Some(token);
                async { Ok::<_, UpstreamError>(()) }
            })
            .await;
        assert!(result.is_ok());
        assert!(captured.unwrap().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_is_not_a_timeout() {
        let parent = CancellationToken::new();
        parent.cancel();
        let result: UpstreamResult<()> = TimeoutGuard::new(Duration::from_secs(5))
            .with_parent(parent)
            .run(|token| async move {
                cancellable(&token, futures::future::pending()).await
            })
            .await;
        assert!(matches!(result, Err(UpstreamError::Cancelled)));
    }

    #[tokio::test]
    async fn op_failure_propagates_unchanged() {
        let result: UpstreamResult<()> = with_timeout(Duration::from_secs(1), "x", |_| async {
            Err(UpstreamError::http(404, "Unknown Channel"))
        })
        .await;
        assert!(matches!(result, Err(UpstreamError::Http { status: 404, .. })));
    }
}

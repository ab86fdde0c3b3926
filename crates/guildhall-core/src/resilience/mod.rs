//! Resilience primitives for upstream calls.
//!
//! Upstream calls compose as `RetryExecutor` around `TimeoutGuard` around the
//! platform call; the `RateLimitClassifier` decides, per failure, whether the
//! executor may try again and how long it has to wait first.

pub mod backoff;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

pub use backoff::{PolicyError, RetryPolicy};
pub use rate_limit::{RateLimitClassifier, RateLimitDecision};
pub use retry::{RetryExecutor, RetryNotice};
pub use timeout::{TimeoutGuard, cancellable, with_timeout};

//! Retry, circuit breaking, and run-level cancellation.
//!
//! # Submodules
//!
//! - [`retry`]: [`RetryPolicy`], stateless exponential backoff with jitter
//! - [`breaker`]: [`CircuitBreaker`] and the lazily keyed [`BreakerRegistry`]
//!
//! Every outbound stage call goes through [`guarded`]: the breaker decides
//! whether the call may start, the policy retries it, and the final outcome
//! is reported back to the breaker exactly once.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerRegistry, BreakerState, CircuitBreaker};
pub use retry::RetryPolicy;

use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run-level deadline plus external cancellation.
///
/// Cloning shares the same token, so cancelling any clone stops the run.
#[derive(Debug, Clone)]
pub struct RunScope {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl RunScope {
    /// A scope that expires `deadline` from now, if given.
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline: deadline.map(|d| Instant::now() + d),
            token: CancellationToken::new(),
        }
    }

    /// A scope that only ends on explicit cancellation.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Sleep for `duration`. Returns `false` if the scope expired first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_expired() {
            return false;
        }
        let wake = Instant::now() + duration;
        let (target, cut_short) = match self.deadline {
            Some(deadline) if deadline < wake => (deadline, true),
            _ => (wake, false),
        };
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = sleep_until(target) => !cut_short,
        }
    }
}

/// Run `operation` behind `breaker` with `policy` retries.
///
/// Returns [`PipelineError::BreakerOpen`] without calling anything if the
/// breaker refuses, and [`PipelineError::Cancelled`] if the scope already
/// expired.
pub async fn guarded<T, F, Fut>(
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    scope: &RunScope,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if scope.is_expired() {
        return Err(PipelineError::Cancelled);
    }
    if !breaker.allow() {
        debug!(key = breaker.key(), "Breaker open; skipping call");
        return Err(PipelineError::BreakerOpen {
            key: breaker.key().to_string(),
        });
    }

    let outcome = policy.execute_within(scope, operation).await;
    match &outcome {
        Ok(_) => breaker.record_success(),
        Err(e) if e.counts_against_breaker() => breaker.record_failure(),
        Err(_) => breaker.record_neutral(),
    }
    outcome
}

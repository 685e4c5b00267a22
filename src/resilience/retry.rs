//! Retry with exponential backoff and jitter.
//!
//! A [`RetryPolicy`] is an immutable value: the attempt counter lives on the
//! stack of each [`RetryPolicy::execute`] call, so one policy can be shared by
//! any number of concurrent callers.
//!
//! # Backoff Strategy
//!
//! ```text
//! delay(attempt) = min(max_delay, base_delay * 2^attempt) * uniform(1 - jitter, 1 + jitter)
//! ```
//!
//! The jittered value is capped at `max_delay` again, so no sleep ever
//! exceeds the configured ceiling.

use super::RunScope;
use crate::config::RetrySettings;
use crate::error::{PipelineError, Result};
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Decides whether a failure is worth another attempt.
pub type RetryPredicate = fn(&PipelineError) -> bool;

#[derive(Clone)]
pub struct RetryPolicy {
    name: &'static str,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
    retryable: RetryPredicate,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter_fraction", &self.jitter_fraction)
            .finish()
    }
}

impl RetryPolicy {
    pub fn new(
        name: &'static str,
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_fraction: f64,
        retryable: RetryPredicate,
    ) -> Self {
        Self {
            name,
            max_retries,
            base_delay,
            max_delay,
            jitter_fraction: jitter_fraction.clamp(0.0, 1.0),
            retryable,
        }
    }

    /// Outbound HTTP calls: retries timeouts, resets, 429 and 5xx.
    pub fn network(settings: &RetrySettings) -> Self {
        Self::new(
            "network",
            settings.max_retries,
            settings.base_delay,
            settings.max_delay,
            settings.jitter_fraction,
            PipelineError::is_retryable,
        )
    }

    /// Payload parsing where a truncated read may succeed on a second try.
    pub fn parsing() -> Self {
        Self::new(
            "parsing",
            2,
            Duration::from_millis(500),
            Duration::from_secs(60),
            0.5,
            |e| matches!(e, PipelineError::Parse(_)) || e.is_transient_io(),
        )
    }

    /// Local disk writes.
    pub fn file() -> Self {
        Self::new(
            "file",
            3,
            Duration::from_secs(1),
            Duration::from_secs(10),
            0.5,
            PipelineError::is_transient_io,
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Nominal (pre-jitter) delay after the failed attempt number `attempt`,
    /// counting from zero.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_fraction == 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = self.jitter_fraction;
        let factor: f64 = rng().random_range((1.0 - spread)..=(1.0 + spread));
        Duration::from_secs_f64(delay.as_secs_f64() * factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of retries.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_within(&RunScope::unbounded(), operation).await
    }

    /// Like [`execute`](Self::execute), but stops retrying once `scope`
    /// expires. An attempt already in flight is allowed to finish.
    pub async fn execute_within<T, F, Fut>(&self, scope: &RunScope, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if scope.is_expired() {
            return Err(PipelineError::Cancelled);
        }

        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            policy = self.name,
                            attempts = attempt + 1,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !(self.retryable)(&e) => {
                    debug!(policy = self.name, error = %e, "Non-retryable failure");
                    return Err(e);
                }
                Err(e) if attempt >= self.max_retries => {
                    error!(
                        policy = self.name,
                        attempts = attempt + 1,
                        max = self.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.jittered(self.backoff_delay(attempt));
                    attempt += 1;
                    warn!(
                        policy = self.name,
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "Attempt failed; backing off"
                    );
                    if !scope.sleep(delay).await {
                        warn!(policy = self.name, attempt, "Run deadline reached; abandoning retries");
                        return Err(e);
                    }
                }
            }
        }
    }
}

//! Keyed circuit breakers.
//!
//! # State Machine
//!
//! ```text
//!            failures >= threshold              recovery_timeout elapsed
//!  CLOSED ---------------------------> OPEN ---------------------------> HALF_OPEN
//!    ^                                  ^      (allow() admits one probe)    |
//!    |            probe fails           |                                    |
//!    |          <-----------------------+------------------------------------+
//!    |                          probe succeeds                               |
//!    +-----------------------------------------------------------------------+
//! ```
//!
//! Each breaker serializes its own transitions behind a mutex. The
//! [`BreakerRegistry`] lock is only held to look up or insert a breaker, so
//! breakers for different keys never contend on state changes.

use crate::config::BreakerSettings;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// A failure gate for one key (a strategy name or a host).
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, settings: &BreakerSettings) -> Self {
        Self {
            key: key.into(),
            failure_threshold: settings.failure_threshold.max(1),
            recovery_timeout: settings.recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State is always left consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Whether a call may proceed right now.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    pub(crate) fn allow_at(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.recovery_timeout);
                if cooled {
                    inner.state = BreakerState::HalfOpen;
                    info!(key = %self.key, "Circuit half-open; admitting probe");
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            info!(key = %self.key, "Circuit closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub(crate) fn record_failure_at(&self, now: Instant) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                warn!(key = %self.key, "Probe failed; circuit re-opened");
            }
            BreakerState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                warn!(
                    key = %self.key,
                    failures = inner.consecutive_failures,
                    threshold = self.failure_threshold,
                    "Circuit opened"
                );
            }
            _ => {
                debug!(key = %self.key, failures = inner.consecutive_failures, "Failure recorded");
            }
        }
    }

    /// Finish an admitted call whose outcome says nothing about the target
    /// (bad input, cancellation). A pending probe is handed back so the next
    /// `allow()` can admit a fresh one.
    pub fn record_neutral(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Open;
        }
    }
}

/// Lazily created breakers, one per key.
#[derive(Debug)]
pub struct BreakerRegistry {
    name: &'static str,
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(name: &'static str, settings: BreakerSettings) -> Self {
        Self {
            name,
            settings,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The breaker for `key`, created on first use.
    pub fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(key, &self.settings))),
        )
    }

    /// Current state of every breaker, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, BreakerState)> {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut states: Vec<_> = breakers
            .iter()
            .map(|(key, breaker)| (key.clone(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}

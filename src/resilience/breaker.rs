//! Circuit Breaker Module
//!
//! Protects the upstream from being hammered while it is failing.
//!
//! ```text
//! Closed   --failure_count reaches threshold-->  Open
//! Open     --first call after next_attempt_at--> HalfOpen (that call is the probe)
//! HalfOpen --probe succeeds-->                   Closed
//! HalfOpen --probe fails-->                      Open
//! ```
//!
//! The Open to HalfOpen transition happens lazily on access. Claiming the
//! probe is a single check-and-set under the state lock, so concurrent
//! callers arriving after the recovery timeout elect exactly one probe.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AccessError, Result};

/// Failures in a row that open the breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Time spent Open before a probe is allowed
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

// == Breaker State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

// == Breaker Config ==
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
        }
    }
}

// == Breaker Snapshot ==
/// Point-in-time view for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    /// Milliseconds since the last recorded failure
    pub last_failure_ms_ago: Option<u64>,
    /// Milliseconds until a probe is allowed (Open only)
    pub next_attempt_in_ms: Option<u64>,
    /// Calls rejected without reaching the upstream
    pub rejected: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
    rejected: u64,
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

// == Circuit Breaker ==
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
                next_attempt_at: None,
                rejected: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    // == Call ==
    /// Runs `operation` if the breaker admits it and records the outcome.
    ///
    /// Rejected calls fail with [`AccessError::BreakerOpen`] and are not
    /// counted as failures.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let mut guard = ProbeGuard {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let result = operation().await;
        guard.armed = false;

        match &result {
            Ok(_) => self.on_success(admission),
            Err(err) if err.is_upstream_failure() => self.on_failure(admission),
            Err(err) => {
                debug!("Breaker ignoring non-upstream error: {}", err);
                // The probe said nothing about the upstream; go back to Open
                // so a later call can probe again.
                if admission == Admission::Probe {
                    self.reopen_unsettled_probe("ended without an upstream outcome");
                }
            }
        }
        result
    }

    /// Check-and-claim step, never suspends.
    fn admit(&self) -> Result<Admission> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(Admission::Normal),
            BreakerState::Open => {
                let due = inner
                    .next_attempt_at
                    .map_or(true, |at| Instant::now() >= at);
                if due {
                    inner.state = BreakerState::HalfOpen;
                    info!("Circuit breaker half-open, probing upstream");
                    Ok(Admission::Probe)
                } else {
                    inner.rejected += 1;
                    Err(AccessError::BreakerOpen)
                }
            }
            // A probe is already in flight
            BreakerState::HalfOpen => {
                inner.rejected += 1;
                Err(AccessError::BreakerOpen)
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        match (inner.state, admission) {
            (BreakerState::HalfOpen, Admission::Probe) => {
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.next_attempt_at = None;
                info!("Circuit breaker closed, upstream recovered");
            }
            (BreakerState::Closed, _) => inner.failure_count = 0,
            // Late success of a call admitted before the breaker opened
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_at = Some(now);

        match (inner.state, admission) {
            (BreakerState::HalfOpen, Admission::Probe) => {
                self.trip(&mut inner, now);
                warn!("Circuit breaker probe failed, reopening");
            }
            (BreakerState::Closed, _) if inner.failure_count >= self.config.failure_threshold => {
                self.trip(&mut inner, now);
                warn!(
                    "Circuit breaker opened after {} failures, retry in {:?}",
                    inner.failure_count, self.config.recovery_timeout
                );
            }
            _ => {}
        }
    }

    /// Returns a HalfOpen breaker to Open without counting a failure.
    fn reopen_unsettled_probe(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            self.trip(&mut inner, Instant::now());
            warn!("Circuit breaker probe {}, reopening", reason);
        }
    }

    fn trip(&self, inner: &mut Inner, now: Instant) {
        inner.state = BreakerState::Open;
        inner.next_attempt_at = Some(now + self.config.recovery_timeout);
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock();
        let now = Instant::now();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_ms_ago: inner
                .last_failure_at
                .map(|at| now.saturating_duration_since(at).as_millis() as u64),
            next_attempt_in_ms: match inner.state {
                BreakerState::Open => inner
                    .next_attempt_at
                    .map(|at| at.saturating_duration_since(now).as_millis() as u64),
                _ => None,
            },
            rejected: inner.rejected,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Reopens the breaker if a probe is dropped before it settles, so the
/// breaker never stays HalfOpen without a probe in flight.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.reopen_unsettled_probe("abandoned");
        }
    }
}

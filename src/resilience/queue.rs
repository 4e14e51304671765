//! Admission Queue Module
//!
//! Bounds how many upstream operations run at once. Callers beyond the limit
//! wait in a FIFO queue of fixed capacity; a full queue rejects immediately.
//!
//! The limit is read from a [`ConcurrencyLimit`] provider on every dispatch
//! decision, so operators can retune it while the service runs.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{AccessError, Result};

pub const DEFAULT_QUEUE_CAPACITY: usize = 50;
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

// == Concurrency Limit ==
/// Source of the live concurrency limit.
pub trait ConcurrencyLimit: Send + Sync {
    fn max_concurrent(&self) -> anyhow::Result<usize>;
}

impl<F> ConcurrencyLimit for F
where
    F: Fn() -> anyhow::Result<usize> + Send + Sync,
{
    fn max_concurrent(&self) -> anyhow::Result<usize> {
        self()
    }
}

// == Queue Config ==
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Maximum number of waiting tasks
    pub capacity: usize,
    /// Limit used when the provider fails or reports zero
    pub fallback_max_concurrent: usize,
    /// Queue depth above which the longer delay applies
    pub busy_depth: usize,
    /// Delay before running a task while the queue is deep
    pub busy_delay: Duration,
    /// Delay before running a task otherwise
    pub idle_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            fallback_max_concurrent: DEFAULT_MAX_CONCURRENT,
            busy_depth: 10,
            busy_delay: Duration::from_millis(500),
            idle_delay: Duration::from_millis(200),
        }
    }
}

// == Queue Snapshot ==
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub active: usize,
    pub waiting: usize,
    pub capacity: usize,
    pub max_concurrent: usize,
    pub dispatched: u64,
    pub rejected: u64,
}

struct Dispatch {
    slot: Slot,
    delay: Duration,
}

#[derive(Default)]
struct State {
    active: usize,
    waiting: VecDeque<oneshot::Sender<Dispatch>>,
    dispatched: u64,
    rejected: u64,
}

struct Shared {
    config: QueueConfig,
    limit: Arc<dyn ConcurrencyLimit>,
    state: Mutex<State>,
}

impl Shared {
    fn max_concurrent(&self) -> usize {
        match self.limit.max_concurrent() {
            Ok(0) => {
                debug!("Concurrency limit of 0 ignored, using fallback");
                self.config.fallback_max_concurrent
            }
            Ok(limit) => limit,
            Err(err) => {
                warn!("Concurrency limit unavailable, using fallback: {:#}", err);
                self.config.fallback_max_concurrent
            }
        }
    }

    /// Starts waiters while slots are free. Runs under the state lock.
    fn dispatch(self: &Arc<Self>, state: &mut State) {
        let max_concurrent = self.max_concurrent();

        while state.active < max_concurrent {
            let depth = state.waiting.len();
            let Some(waiter) = state.waiting.pop_front() else {
                break;
            };

            let delay = if depth > self.config.busy_depth {
                self.config.busy_delay
            } else {
                self.config.idle_delay
            };

            state.active += 1;
            let dispatch = Dispatch {
                slot: Slot {
                    shared: self.clone(),
                    armed: true,
                },
                delay,
            };

            match waiter.send(dispatch) {
                Ok(()) => state.dispatched += 1,
                Err(mut returned) => {
                    // Caller gave up while waiting; reclaim the slot here,
                    // the lock is already held.
                    returned.slot.armed = false;
                    state.active -= 1;
                }
            }
        }
    }
}

/// One occupied execution slot. Releasing it re-triggers dispatch.
struct Slot {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.shared.state.lock();
            state.active = state.active.saturating_sub(1);
            self.shared.dispatch(&mut state);
        }
    }
}

// == Admission Queue ==
#[derive(Clone)]
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl AdmissionQueue {
    pub fn new(config: QueueConfig, limit: Arc<dyn ConcurrencyLimit>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                limit,
                state: Mutex::new(State::default()),
            }),
        }
    }

    // == Enqueue ==
    /// Runs `task` once a slot is free and returns its result.
    ///
    /// Fails fast with [`AccessError::QueueFull`] when `capacity` tasks are
    /// already waiting; the task is not run in that case.
    pub async fn enqueue<T, F, Fut>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ticket = {
            let mut state = self.shared.state.lock();
            state.waiting.retain(|waiter| !waiter.is_closed());

            if state.waiting.len() >= self.shared.config.capacity {
                state.rejected += 1;
                warn!(
                    "Admission queue full ({} waiting), rejecting request",
                    state.waiting.len()
                );
                return Err(AccessError::QueueFull {
                    capacity: self.shared.config.capacity,
                });
            }

            let (tx, rx) = oneshot::channel();
            state.waiting.push_back(tx);
            self.shared.dispatch(&mut state);
            rx
        };

        let Dispatch { slot: _slot, delay } = ticket
            .await
            .map_err(|_| AccessError::Internal("admission queue dropped a waiter".to_string()))?;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        task().await
    }

    /// Re-runs dispatch, e.g. after the concurrency limit was raised.
    pub fn reconsider(&self) {
        let mut state = self.shared.state.lock();
        self.shared.dispatch(&mut state);
    }

    pub fn max_concurrent(&self) -> usize {
        self.shared.max_concurrent()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.shared.state.lock();
        QueueSnapshot {
            active: state.active,
            waiting: state.waiting.len(),
            capacity: self.shared.config.capacity,
            max_concurrent: self.shared.max_concurrent(),
            dispatched: state.dispatched,
            rejected: state.rejected,
        }
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionQueue")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

//! Resilience Module
//!
//! Protective layers wrapped around every upstream call:
//! - Request deduplication (single-flight per key)
//! - Admission queue (bounded concurrency with backpressure)
//! - Circuit breaker (fail fast while the upstream is down)
//! - Load monitor (leveled alerts on in-flight count)

mod breaker;
mod dedup;
mod monitor;
mod queue;

pub use breaker::{
    BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_RECOVERY_TIMEOUT,
};
pub use dedup::{RequestDeduplicator, DEFAULT_SAFETY_TIMEOUT};
pub use monitor::{ActiveGuard, LoadLevel, LoadMonitor, LoadThresholds, MonitorSnapshot};
pub use queue::{
    AdmissionQueue, ConcurrencyLimit, QueueConfig, QueueSnapshot, DEFAULT_MAX_CONCURRENT,
    DEFAULT_QUEUE_CAPACITY,
};

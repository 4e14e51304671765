//! Upstream Guard - a resilient access layer in front of a slow upstream
//!
//! Combines a TTL cache (memory or file backed), single-flight request
//! deduplication, a bounded admission queue, a circuit breaker and a load
//! monitor, and exposes them through a small operator API.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod resilience;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{AccessError, Result};
pub use gateway::Gateway;
pub use tasks::spawn_cleanup_task;

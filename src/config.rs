//! Configuration Module
//!
//! Handles loading and managing service configuration from environment
//! variables.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheMode;
use crate::resilience::{BreakerConfig, LoadThresholds, QueueConfig};

/// Resource categories with their default TTLs in minutes.
pub const DEFAULT_CATEGORY_TTLS: [(&str, u64); 5] = [
    ("home", 5),
    ("libraries", 60),
    ("series", 15),
    ("books", 15),
    ("images", 1440),
];

/// TTL in minutes for categories without an explicit setting
pub const FALLBACK_TTL_MINUTES: u64 = 10;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream library server
    pub upstream_url: String,
    /// Timeout for a single upstream request in seconds
    pub upstream_timeout: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Initially active cache mode
    pub cache_mode: CacheMode,
    /// Directory holding file-mode entries
    pub cache_dir: PathBuf,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Initial limit of concurrent upstream calls
    pub max_concurrent: usize,
    /// Maximum number of requests waiting for a slot
    pub queue_capacity: usize,
    /// Consecutive failures that open the circuit breaker
    pub breaker_failure_threshold: u32,
    /// Seconds the breaker stays open before probing
    pub breaker_recovery_timeout: u64,
    /// Seconds after which a pending deduplicated request releases its key
    pub dedup_timeout: u64,
    /// Load monitor alert thresholds
    pub monitor_thresholds: LoadThresholds,
    /// TTL in minutes per resource category
    pub category_ttls: BTreeMap<String, u64>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `UPSTREAM_URL` - Upstream base URL (default: http://127.0.0.1:8080)
    /// - `UPSTREAM_TIMEOUT` - Upstream request timeout in seconds (default: 30)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_MODE` - `memory` or `file` (default: memory)
    /// - `CACHE_DIR` - File-mode directory (default: ./cache)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 60)
    /// - `MAX_CONCURRENT` - Concurrent upstream calls (default: 4)
    /// - `QUEUE_CAPACITY` - Waiting requests before rejecting (default: 50)
    /// - `BREAKER_FAILURE_THRESHOLD` - Failures before opening (default: 5)
    /// - `BREAKER_RECOVERY_TIMEOUT` - Seconds open before probing (default: 30)
    /// - `DEDUP_TIMEOUT` - Pending request safety timeout in seconds (default: 60)
    /// - `MONITOR_WARNING` / `MONITOR_HIGH` / `MONITOR_CRITICAL` - Load alert
    ///   thresholds (default: 10 / 25 / 50)
    /// - `TTL_HOME`, `TTL_LIBRARIES`, `TTL_SERIES`, `TTL_BOOKS`, `TTL_IMAGES` -
    ///   Category TTLs in minutes
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let category_ttls = defaults
            .category_ttls
            .iter()
            .map(|(category, minutes)| {
                let var = format!("TTL_{}", category.to_ascii_uppercase());
                (category.clone(), parse_env(&var, *minutes))
            })
            .collect();

        Self {
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            upstream_timeout: parse_env("UPSTREAM_TIMEOUT", defaults.upstream_timeout),
            server_port: parse_env("SERVER_PORT", defaults.server_port),
            cache_mode: parse_env("CACHE_MODE", defaults.cache_mode),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cleanup_interval: parse_env("CLEANUP_INTERVAL", defaults.cleanup_interval),
            max_concurrent: parse_env("MAX_CONCURRENT", defaults.max_concurrent),
            queue_capacity: parse_env("QUEUE_CAPACITY", defaults.queue_capacity),
            breaker_failure_threshold: parse_env(
                "BREAKER_FAILURE_THRESHOLD",
                defaults.breaker_failure_threshold,
            ),
            breaker_recovery_timeout: parse_env(
                "BREAKER_RECOVERY_TIMEOUT",
                defaults.breaker_recovery_timeout,
            ),
            dedup_timeout: parse_env("DEDUP_TIMEOUT", defaults.dedup_timeout),
            monitor_thresholds: LoadThresholds {
                warning: parse_env("MONITOR_WARNING", defaults.monitor_thresholds.warning),
                high: parse_env("MONITOR_HIGH", defaults.monitor_thresholds.high),
                critical: parse_env("MONITOR_CRITICAL", defaults.monitor_thresholds.critical),
            },
            category_ttls,
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(self.breaker_recovery_timeout.max(1)),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            fallback_max_concurrent: self.max_concurrent.max(1),
            ..QueueConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_url: "http://127.0.0.1:8080".to_string(),
            upstream_timeout: 30,
            server_port: 3000,
            cache_mode: CacheMode::Memory,
            cache_dir: PathBuf::from("./cache"),
            cleanup_interval: 60,
            max_concurrent: 4,
            queue_capacity: 50,
            breaker_failure_threshold: 5,
            breaker_recovery_timeout: 30,
            dedup_timeout: 60,
            monitor_thresholds: LoadThresholds::default(),
            category_ttls: DEFAULT_CATEGORY_TTLS
                .iter()
                .map(|(category, minutes)| (category.to_string(), *minutes))
                .collect(),
        }
    }
}

/// Reads and parses an environment variable, falling back on absence or
/// parse failure.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! Gateway Module
//!
//! Composition root of the access layer. Every upstream fetch goes through
//!
//! ```text
//! CacheStore::get_or_set
//!   -> RequestDeduplicator (one in-flight fetch per key)
//!     -> AdmissionQueue (bounded concurrency)
//!       -> CircuitBreaker (fail fast while upstream is down)
//!         -> LoadMonitor (in-flight accounting)
//!           -> upstream call
//! ```

mod settings;
mod upstream;

pub use settings::RuntimeSettings;
pub use upstream::{HttpUpstream, UpstreamPayload};

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::cache::{CacheMode, CacheSize, CacheStats, CacheStore};
use crate::config::Config;
use crate::error::{AccessError, Result};
use crate::resilience::{
    AdmissionQueue, BreakerConfig, BreakerSnapshot, CircuitBreaker, LoadMonitor,
    LoadThresholds, MonitorSnapshot, QueueConfig, QueueSnapshot, RequestDeduplicator,
};

// == Gateway Stats ==
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub cache_mode: CacheMode,
    pub cache: CacheStats,
    pub cache_size: CacheSize,
    pub breaker: BreakerSnapshot,
    pub queue: QueueSnapshot,
    pub monitor: MonitorSnapshot,
    pub in_flight_keys: usize,
}

/// Explicit construction parameters for a [`Gateway`].
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub cache_dir: PathBuf,
    pub cache_mode: CacheMode,
    pub queue: QueueConfig,
    pub breaker: BreakerConfig,
    pub thresholds: LoadThresholds,
    pub dedup_timeout: Duration,
}

impl GatewayOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
            cache_mode: config.cache_mode,
            queue: config.queue_config(),
            breaker: config.breaker_config(),
            thresholds: config.monitor_thresholds,
            dedup_timeout: Duration::from_secs(config.dedup_timeout),
        }
    }
}

// == Gateway ==
/// Owns one instance of each access-layer component.
#[derive(Debug)]
pub struct Gateway<V> {
    cache: Arc<CacheStore<V>>,
    dedup: RequestDeduplicator<V>,
    queue: AdmissionQueue,
    breaker: Arc<CircuitBreaker>,
    monitor: Arc<LoadMonitor>,
    settings: Arc<RuntimeSettings>,
}

impl<V> Gateway<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(options: GatewayOptions, settings: Arc<RuntimeSettings>) -> Self {
        info!(
            "Access layer: cache_mode={}, queue_capacity={}, failure_threshold={}, recovery_timeout={:?}",
            options.cache_mode,
            options.queue.capacity,
            options.breaker.failure_threshold,
            options.breaker.recovery_timeout
        );

        Self {
            cache: Arc::new(CacheStore::new(options.cache_dir, options.cache_mode)),
            dedup: RequestDeduplicator::new(options.dedup_timeout),
            queue: AdmissionQueue::new(options.queue, settings.clone()),
            breaker: Arc::new(CircuitBreaker::new(options.breaker)),
            monitor: Arc::new(LoadMonitor::new(options.thresholds)),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            GatewayOptions::from_config(config),
            Arc::new(RuntimeSettings::from_config(config)),
        )
    }

    // == Fetch ==
    /// Returns the value for `key` from cache, or fetches it through the
    /// protected upstream path and caches it for `ttl_seconds`.
    pub async fn fetch<F, Fut>(&self, key: &str, ttl_seconds: u64, fetcher: F) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        self.cache
            .get_or_set(key, ttl_seconds, || {
                let queue = self.queue.clone();
                let breaker = self.breaker.clone();
                let monitor = self.monitor.clone();

                self.dedup.deduplicate(key, move || async move {
                    queue
                        .enqueue(|| {
                            breaker.call(|| async move {
                                let _active = monitor.track();
                                fetcher().await.map_err(AccessError::upstream)
                            })
                        })
                        .await
                })
            })
            .await
    }

    /// Fetches a resource of `category`, keyed `"{category}:{resource}"` and
    /// cached for the category's current TTL.
    pub async fn fetch_category<F, Fut>(
        &self,
        category: &str,
        resource: &str,
        fetcher: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let key = cache_key(category, resource);
        let ttl_seconds = self.settings.ttl_seconds(category);
        self.fetch(&key, ttl_seconds, fetcher).await
    }

    // == Knobs ==
    pub fn cache_mode(&self) -> CacheMode {
        self.cache.mode()
    }

    pub fn set_cache_mode(&self, mode: CacheMode) {
        self.cache.set_mode(mode);
    }

    pub fn max_concurrent(&self) -> usize {
        self.settings.max_concurrent()
    }

    /// Updates the concurrency limit and lets waiting requests use any newly
    /// freed slots right away.
    pub fn set_max_concurrent(&self, max_concurrent: usize) -> Result<()> {
        self.settings.set_max_concurrent(max_concurrent)?;
        info!("Max concurrent upstream calls set to {}", max_concurrent);
        self.queue.reconsider();
        Ok(())
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn cache(&self) -> Arc<CacheStore<V>> {
        self.cache.clone()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn monitor(&self) -> &LoadMonitor {
        &self.monitor
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            cache_mode: self.cache.mode(),
            cache: self.cache.stats(),
            cache_size: self.cache.size().await,
            breaker: self.breaker.snapshot(),
            queue: self.queue.snapshot(),
            monitor: self.monitor.snapshot(),
            in_flight_keys: self.dedup.in_flight(),
        }
    }
}

pub fn cache_key(category: &str, resource: &str) -> String {
    format!("{}:{}", category, resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn gateway(dir: &TempDir) -> Gateway<String> {
        let options = GatewayOptions {
            cache_dir: dir.path().to_path_buf(),
            cache_mode: CacheMode::Memory,
            queue: QueueConfig {
                capacity: 10,
                fallback_max_concurrent: 2,
                busy_depth: 10,
                busy_delay: Duration::ZERO,
                idle_delay: Duration::ZERO,
            },
            breaker: BreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(30),
            },
            thresholds: LoadThresholds::default(),
            dedup_timeout: Duration::from_secs(60),
        };
        let settings = Arc::new(RuntimeSettings::from_config(&Config::default()));
        Gateway::new(options, settings)
    }

    #[tokio::test]
    async fn test_fetch_caches_result() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = gateway
                .fetch("home:", 60, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("home page".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "home page");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.monitor().active(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let dir = TempDir::new().unwrap();
        let gateway = Arc::new(gateway(&dir));
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let gateway = gateway.clone();
                let calls = calls.clone();
                let gate = gate.clone();
                tokio::spawn(async move {
                    gateway
                        .fetch_category("series", "42", move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            gate.notified().await;
                            Ok("series 42".to_string())
                        })
                        .await
                })
            })
            .collect();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "series 42");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gateway.cache().get("series:42").await,
            Some("series 42".to_string())
        );
    }

    #[tokio::test]
    async fn test_failures_open_breaker_and_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);

        for _ in 0..2 {
            let result = gateway
                .fetch("books:1", 60, || async {
                    Err::<String, _>(anyhow::anyhow!("upstream 500"))
                })
                .await;
            assert!(matches!(result, Err(AccessError::Upstream(_))));
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let result = gateway
            .fetch("books:1", 60, move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok("book".to_string())
            })
            .await;

        assert!(matches!(result, Err(AccessError::BreakerOpen)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(gateway.cache().get("books:1").await, None);
        assert_eq!(gateway.monitor().active(), 0);
    }

    #[tokio::test]
    async fn test_set_max_concurrent_rejects_zero() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);

        gateway.set_max_concurrent(8).unwrap();
        assert_eq!(gateway.max_concurrent(), 8);
        assert_eq!(gateway.queue().snapshot().max_concurrent, 8);
        assert!(gateway.set_max_concurrent(0).is_err());
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let dir = TempDir::new().unwrap();
        let gateway = gateway(&dir);
        gateway
            .fetch("home:", 60, || async { Ok("x".to_string()) })
            .await
            .unwrap();

        let stats = gateway.stats().await;
        assert_eq!(stats.cache_mode, CacheMode::Memory);
        assert_eq!(stats.cache_size.entries, 1);
        assert_eq!(stats.cache.writes, 1);
        assert_eq!(stats.queue.dispatched, 1);
        assert_eq!(stats.monitor.peak, 1);
        assert_eq!(stats.in_flight_keys, 0);
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_key("books", "api/books/7"), "books:api/books/7");
    }
}

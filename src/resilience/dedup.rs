//! Request Deduplicator Module
//!
//! Single-flight: concurrent requests for the same key share one in-flight
//! operation and all observe its outcome. Nothing is kept after settlement.
//!
//! The operation runs on its own task, so it completes even when every
//! caller stops waiting. A registration is dropped when the operation
//! settles, and in any case once the safety timeout elapses, so an
//! operation that never settles cannot pin its key forever.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{AccessError, Result};

pub const DEFAULT_SAFETY_TIMEOUT: Duration = Duration::from_secs(60);

type SharedResult<V> = Shared<BoxFuture<'static, Result<V>>>;

struct PendingOperation<V> {
    id: u64,
    future: SharedResult<V>,
}

type PendingMap<V> = Arc<Mutex<HashMap<String, PendingOperation<V>>>>;

// == Request Deduplicator ==
pub struct RequestDeduplicator<V> {
    pending: PendingMap<V>,
    next_id: AtomicU64,
    safety_timeout: Duration,
}

impl<V> RequestDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(safety_timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            safety_timeout,
        }
    }

    // == Deduplicate ==
    /// Joins the pending operation for `key`, or starts `fetcher` and
    /// registers it as the pending operation.
    pub async fn deduplicate<F, Fut>(&self, key: &str, fetcher: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let future = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(operation) => {
                    debug!("Joining in-flight request for '{}'", key);
                    operation.future.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = self.start(key, id, fetcher());
                    pending.insert(
                        key.to_string(),
                        PendingOperation {
                            id,
                            future: future.clone(),
                        },
                    );
                    future
                }
            }
        };

        future.await
    }

    /// Spawns the operation together with its safety-timeout reaper.
    fn start<Fut>(&self, key: &str, id: u64, operation: Fut) -> SharedResult<V>
    where
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let reaper = {
            let pending = self.pending.clone();
            let key = key.to_string();
            let timeout = self.safety_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if remove_registration(&pending, &key, id) {
                    warn!(
                        "Request for '{}' still pending after {:?}, releasing key",
                        key, timeout
                    );
                }
            })
        };

        let pending = self.pending.clone();
        let key = key.to_string();
        let reaper = reaper.abort_handle();
        let task = tokio::spawn(async move {
            let result = operation.await;
            remove_registration(&pending, &key, id);
            reaper.abort();
            result
        });

        async move {
            task.await.unwrap_or_else(|err| {
                Err(AccessError::Internal(format!("deduplicated request failed: {}", err)))
            })
        }
        .boxed()
        .shared()
    }

    /// Number of keys with an operation in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }
}

impl<V> Default for RequestDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_TIMEOUT)
    }
}

impl<V> std::fmt::Debug for RequestDeduplicator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduplicator")
            .field("in_flight", &self.pending.lock().len())
            .field("safety_timeout", &self.safety_timeout)
            .finish()
    }
}

/// Removes the registration only if it still belongs to operation `id`.
fn remove_registration<V>(pending: &PendingMap<V>, key: &str, id: u64) -> bool {
    let mut pending = pending.lock();
    if pending.get(key).is_some_and(|operation| operation.id == id) {
        pending.remove(key);
        true
    } else {
        false
    }
}

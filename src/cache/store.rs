//! Cache Store Module
//!
//! Main cache engine: TTL-aware key/value storage with two interchangeable
//! backends selected by a runtime-switchable [`CacheMode`].
//!
//! Every operation snapshots the mode once when it starts. Switching modes
//! never migrates entries, it only redirects later reads and writes.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::file::FileCacheError;
use crate::cache::{
    CacheMode, CacheStats, EntryInfo, FileBackend, MemoryBackend, MAX_KEY_LENGTH,
};
use crate::error::{AccessError, Result};

// == Cache Size ==
/// Aggregate size of the active backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheSize {
    pub entries: usize,
    pub bytes: u64,
}

// == Cache Store ==
/// TTL cache shared by every caller of the access layer.
#[derive(Debug)]
pub struct CacheStore<V> {
    memory: MemoryBackend<V>,
    file: FileBackend,
    mode: AtomicU8,
    stats: Mutex<CacheStats>,
}

impl<V> CacheStore<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `cache_dir` - Directory used while in file mode
    /// * `mode` - Initially active mode
    pub fn new(cache_dir: impl Into<PathBuf>, mode: CacheMode) -> Self {
        Self {
            memory: MemoryBackend::new(),
            file: FileBackend::new(cache_dir),
            mode: AtomicU8::new(mode.as_u8()),
            stats: Mutex::new(CacheStats::new()),
        }
    }

    // == Mode ==
    pub fn mode(&self) -> CacheMode {
        CacheMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Switches the active backend. Existing entries stay where they are.
    pub fn set_mode(&self, mode: CacheMode) {
        let previous = CacheMode::from_u8(self.mode.swap(mode.as_u8(), Ordering::AcqRel));
        if previous != mode {
            info!("Cache mode switched from {} to {}", previous, mode);
        }
    }

    // == Get ==
    /// Returns the value if present and unexpired in the active backend.
    ///
    /// Misses, including unreadable files, are `None`.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mode = self.mode();
        self.get_in(mode, key).await
    }

    // == Set ==
    /// Stores a value unconditionally, replacing any existing entry.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl_seconds` - Lifetime of the entry
    pub async fn set(&self, key: &str, value: V, ttl_seconds: u64) -> Result<()> {
        validate_key(key)?;
        let mode = self.mode();
        self.set_in(mode, key, value, ttl_seconds).await;
        Ok(())
    }

    // == Get Or Set ==
    /// Returns the cached value, or runs `producer` on a miss and caches its
    /// success.
    ///
    /// A producer error is returned unchanged and nothing is cached.
    pub async fn get_or_set<F, Fut>(&self, key: &str, ttl_seconds: u64, producer: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        validate_key(key)?;
        let mode = self.mode();

        if let Some(value) = self.get_in(mode, key).await {
            return Ok(value);
        }

        let value = producer().await?;
        self.set_in(mode, key, value.clone(), ttl_seconds).await;
        Ok(value)
    }

    // == Invalidate ==
    /// Removes a single key from the active backend.
    pub async fn invalidate(&self, key: &str) -> bool {
        match self.mode() {
            CacheMode::Memory => self.memory.remove(key),
            CacheMode::File => match self.file.remove(key).await {
                Ok(removed) => removed,
                Err(err) => {
                    self.record_io_error(key, &err);
                    false
                }
            },
        }
    }

    /// Removes every key starting with `prefix` from the active backend.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let removed = match self.mode() {
            CacheMode::Memory => self.memory.remove_prefix(prefix),
            CacheMode::File => self
                .file
                .remove_where(|header| header.key.starts_with(prefix))
                .await
                .unwrap_or_else(|err| {
                    self.record_io_error(prefix, &err);
                    0
                }),
        };

        debug!("Invalidated {} entries with prefix '{}'", removed, prefix);
        removed
    }

    // == Clear ==
    /// Removes all entries of the active backend.
    pub async fn clear(&self) -> usize {
        let mode = self.mode();
        let removed = match mode {
            CacheMode::Memory => self.memory.clear(),
            CacheMode::File => self.file.remove_where(|_| true).await.unwrap_or_else(|err| {
                self.record_io_error("*", &err);
                0
            }),
        };

        info!("Cleared {} cache entries ({} mode)", removed, mode);
        removed
    }

    // == Size ==
    /// Entry count and byte total of the active backend, from stored lengths.
    pub async fn size(&self) -> CacheSize {
        self.entries()
            .await
            .iter()
            .fold(CacheSize::default(), |acc, info| CacheSize {
                entries: acc.entries + 1,
                bytes: acc.bytes + info.size_bytes,
            })
    }

    /// Listing of live entries in the active backend.
    pub async fn entries(&self) -> Vec<EntryInfo> {
        match self.mode() {
            CacheMode::Memory => self.memory.entries(),
            CacheMode::File => match self.file.headers().await {
                Ok(headers) => headers
                    .into_iter()
                    .filter(|(_, header)| !header.is_expired())
                    .map(|(_, header)| header.info())
                    .collect(),
                Err(err) => {
                    self.record_io_error("*", &err);
                    Vec::new()
                }
            },
        }
    }

    // == Cleanup Expired ==
    /// Removes expired entries from both backends.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_expired(&self) -> usize {
        let from_memory = self.memory.purge_expired();
        let from_files = self
            .file
            .remove_where(|header| header.is_expired())
            .await
            .unwrap_or_else(|err| {
                self.record_io_error("*", &err);
                0
            });

        from_memory + from_files
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    async fn get_in(&self, mode: CacheMode, key: &str) -> Option<V> {
        let found = match mode {
            CacheMode::Memory => self.memory.get(key),
            CacheMode::File => match self.file.read::<V>(key).await {
                Ok(Some(entry)) if !entry.is_expired() => Some(entry.value),
                Ok(Some(_)) => {
                    // Expired on disk, drop it lazily
                    if let Err(err) = self.file.remove(key).await {
                        self.record_io_error(key, &err);
                    }
                    None
                }
                Ok(None) => None,
                Err(err) => {
                    self.record_io_error(key, &err);
                    None
                }
            },
        };

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.record_hit();
            debug!("Cache hit: {} ({} mode)", key, mode);
        } else {
            stats.record_miss();
            debug!("Cache miss: {} ({} mode)", key, mode);
        }
        found
    }

    async fn set_in(&self, mode: CacheMode, key: &str, value: V, ttl_seconds: u64) {
        match mode {
            CacheMode::Memory => {
                let size = encoded_len(&value);
                self.memory.set(key, value, ttl_seconds, size);
            }
            CacheMode::File => {
                if let Err(err) = self.file.write(key, &value, ttl_seconds).await {
                    self.record_io_error(key, &err);
                    return;
                }
            }
        }

        self.stats.lock().record_write();
    }

    fn record_io_error(&self, key: &str, err: &FileCacheError) {
        warn!("Cache file error for '{}', treating as miss: {}", key, err);
        self.stats.lock().record_io_error();
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(AccessError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(AccessError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// Byte length of the JSON encoding, matching what file mode would store.
fn encoded_len<V: Serialize>(value: &V) -> u64 {
    let mut counter = ByteCounter(0);
    match value.serialize(&mut serde_json::Serializer::new(&mut counter)) {
        Ok(()) => counter.0,
        Err(_) => 0,
    }
}

struct ByteCounter(u64);

impl std::io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0 += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

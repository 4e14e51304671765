//! In-Memory Backend
//!
//! HashMap storage guarded by a read/write lock. Expired entries are dropped
//! lazily when read and in bulk by the cleanup task.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::cache::{CacheEntry, EntryInfo};

// == Memory Backend ==
#[derive(Debug)]
pub struct MemoryBackend<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> MemoryBackend<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    // == Get ==
    /// Returns a clone of the value if present and unexpired.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have
        // replaced it in between.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired()) {
            entries.remove(key);
        }
        None
    }

    // == Set ==
    /// Stores the entry, replacing any previous one as a whole.
    pub fn set(&self, key: &str, value: V, ttl_seconds: u64, size: u64) {
        let entry = CacheEntry::new(value, ttl_seconds, size);
        self.entries.write().insert(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Removes all expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Listing of live entries, using the stored byte length.
    pub fn entries(&self) -> Vec<EntryInfo> {
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(key, entry)| entry.info(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<V: Clone> Default for MemoryBackend<V> {
    fn default() -> Self {
        Self::new()
    }
}

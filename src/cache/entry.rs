//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Storage timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Lifetime in seconds, counted from `stored_at`
    pub ttl_seconds: u64,
    /// Encoded size of the value in bytes
    pub size: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry stored now.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_seconds` - TTL in seconds
    /// * `size` - Encoded byte length of the value
    pub fn new(value: V, ttl_seconds: u64, size: u64) -> Self {
        Self {
            value,
            stored_at: current_timestamp_ms(),
            ttl_seconds,
            size,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry stays valid while `now - stored_at <= ttl` and is expired as
    /// soon as the elapsed time strictly exceeds the TTL.
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.stored_at, self.ttl_seconds, current_timestamp_ms())
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds (0 once expired).
    pub fn ttl_remaining(&self) -> u64 {
        ttl_remaining_at(self.stored_at, self.ttl_seconds, current_timestamp_ms())
    }

    /// Builds the listing view of this entry.
    pub fn info(&self, key: &str) -> EntryInfo {
        EntryInfo::new(key, self.stored_at, self.ttl_seconds, self.size)
    }
}

// == Entry Info ==
/// Diagnostic view of an entry, built without touching the value.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryInfo {
    pub key: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub expires_in_seconds: u64,
}

impl EntryInfo {
    pub fn new(key: &str, stored_at_ms: u64, ttl_seconds: u64, size: u64) -> Self {
        let stored_at = Utc
            .timestamp_millis_opt(stored_at_ms as i64)
            .single()
            .unwrap_or_default();

        Self {
            key: key.to_string(),
            size_bytes: size,
            stored_at,
            ttl_seconds,
            expires_in_seconds: ttl_remaining_at(stored_at_ms, ttl_seconds, current_timestamp_ms()),
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Expiry rule shared by both backends.
pub fn is_expired_at(stored_at: u64, ttl_seconds: u64, now: u64) -> bool {
    now.saturating_sub(stored_at) > ttl_seconds.saturating_mul(1000)
}

fn ttl_remaining_at(stored_at: u64, ttl_seconds: u64, now: u64) -> u64 {
    let expires = stored_at.saturating_add(ttl_seconds.saturating_mul(1000));
    expires.saturating_sub(now) / 1000
}

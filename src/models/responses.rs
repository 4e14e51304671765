//! Response DTOs for the operator API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::{CacheMode, EntryInfo};
use crate::gateway::GatewayStats;

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: GatewayStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(stats: GatewayStats) -> Self {
        let hit_rate = stats.cache.hit_rate();
        Self { stats, hit_rate }
    }
}

/// Response body for GET /cache/entries
#[derive(Debug, Clone, Serialize)]
pub struct EntriesResponse {
    pub mode: CacheMode,
    pub count: usize,
    pub entries: Vec<EntryInfo>,
}

impl EntriesResponse {
    pub fn new(mode: CacheMode, entries: Vec<EntryInfo>) -> Self {
        Self {
            mode,
            count: entries.len(),
            entries,
        }
    }
}

/// Response body for the cache invalidation endpoints
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Success message
    pub message: String,
    /// Number of entries removed
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn key(key: &str, removed: bool) -> Self {
        let message = if removed {
            format!("Key '{}' invalidated", key)
        } else {
            format!("Key '{}' was not cached", key)
        };
        Self {
            message,
            removed: usize::from(removed),
        }
    }

    pub fn prefix(prefix: &str, removed: usize) -> Self {
        Self {
            message: format!("Invalidated {} entries with prefix '{}'", removed, prefix),
            removed,
        }
    }

    pub fn cleared(removed: usize) -> Self {
        Self {
            message: format!("Cleared {} entries", removed),
            removed,
        }
    }
}

/// Response body for GET|PUT /settings/cache-mode
#[derive(Debug, Clone, Serialize)]
pub struct CacheModeResponse {
    pub mode: CacheMode,
}

/// Response body for GET|PUT /settings/max-concurrent
#[derive(Debug, Clone, Serialize)]
pub struct MaxConcurrentResponse {
    pub max_concurrent: usize,
}

/// Response body for PUT /settings/ttl/:category
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub category: String,
    pub minutes: u64,
}

/// Response body for GET /settings/ttl
#[derive(Debug, Clone, Serialize)]
pub struct TtlSettingsResponse {
    /// TTL in minutes per category
    pub ttls: BTreeMap<String, u64>,
    /// TTL applied to categories not listed above
    pub fallback_minutes: u64,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Circuit breaker state, so load balancers can see a degraded upstream
    pub upstream: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(upstream: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            upstream: upstream.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidate_response_messages() {
        let resp = InvalidateResponse::key("books:1", true);
        assert_eq!(resp.removed, 1);
        assert!(resp.message.contains("books:1"));

        let resp = InvalidateResponse::key("books:2", false);
        assert_eq!(resp.removed, 0);
        assert!(resp.message.contains("not cached"));

        let resp = InvalidateResponse::prefix("series:", 3);
        assert_eq!(resp.removed, 3);
        assert!(resp.message.contains("series:"));
    }

    #[test]
    fn test_entries_response_counts() {
        let entries = vec![EntryInfo::new("home:", 0, 60, 12)];
        let resp = EntriesResponse::new(CacheMode::File, entries);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["mode"], "file");
        assert_eq!(json["count"], 1);
        assert_eq!(json["entries"][0]["key"], "home:");
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy("closed");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("closed"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}

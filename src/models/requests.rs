//! Request DTOs for the operator API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::CacheMode;
use crate::error::Result;

/// Upper bound accepted for a category TTL (one year, in minutes)
pub const MAX_TTL_MINUTES: u64 = 525_600;

/// Request body for PUT /settings/cache-mode
#[derive(Debug, Clone, Deserialize)]
pub struct CacheModeRequest {
    /// "memory" or "file"
    pub mode: String,
}

impl CacheModeRequest {
    /// Parses the requested mode.
    pub fn parse(&self) -> Result<CacheMode> {
        self.mode.parse()
    }
}

/// Request body for PUT /settings/max-concurrent
#[derive(Debug, Clone, Deserialize)]
pub struct MaxConcurrentRequest {
    pub max_concurrent: usize,
}

impl MaxConcurrentRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.max_concurrent == 0 {
            return Some("max_concurrent must be at least 1".to_string());
        }
        None
    }
}

/// Request body for PUT /settings/ttl/:category
#[derive(Debug, Clone, Deserialize)]
pub struct TtlRequest {
    /// TTL in minutes
    pub minutes: u64,
}

impl TtlRequest {
    pub fn validate(&self) -> Option<String> {
        if self.minutes > MAX_TTL_MINUTES {
            return Some(format!(
                "TTL exceeds maximum of {} minutes",
                MAX_TTL_MINUTES
            ));
        }
        None
    }
}

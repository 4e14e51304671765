//! Runtime Settings
//!
//! Operator-tunable knobs read live by the access pipeline: the concurrency
//! limit and the per-category TTLs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::config::{Config, FALLBACK_TTL_MINUTES};
use crate::error::{AccessError, Result};
use crate::resilience::ConcurrencyLimit;

#[derive(Debug)]
pub struct RuntimeSettings {
    max_concurrent: AtomicUsize,
    category_ttls: RwLock<BTreeMap<String, u64>>,
}

impl RuntimeSettings {
    pub fn new(max_concurrent: usize, category_ttls: BTreeMap<String, u64>) -> Self {
        Self {
            max_concurrent: AtomicUsize::new(max_concurrent),
            category_ttls: RwLock::new(category_ttls),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_concurrent, config.category_ttls.clone())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::Acquire)
    }

    pub fn set_max_concurrent(&self, max_concurrent: usize) -> Result<()> {
        if max_concurrent == 0 {
            return Err(AccessError::InvalidRequest(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        self.max_concurrent.store(max_concurrent, Ordering::Release);
        Ok(())
    }

    // == TTLs ==
    /// TTL in minutes for `category`, or the fallback for unknown ones.
    pub fn ttl_minutes(&self, category: &str) -> u64 {
        self.category_ttls
            .read()
            .get(category)
            .copied()
            .unwrap_or(FALLBACK_TTL_MINUTES)
    }

    pub fn ttl_seconds(&self, category: &str) -> u64 {
        self.ttl_minutes(category).saturating_mul(60)
    }

    pub fn set_ttl_minutes(&self, category: &str, minutes: u64) -> Result<()> {
        if category.is_empty() {
            return Err(AccessError::InvalidRequest(
                "Category cannot be empty".to_string(),
            ));
        }
        self.category_ttls
            .write()
            .insert(category.to_string(), minutes);
        Ok(())
    }

    pub fn ttls(&self) -> BTreeMap<String, u64> {
        self.category_ttls.read().clone()
    }
}

impl ConcurrencyLimit for RuntimeSettings {
    fn max_concurrent(&self) -> anyhow::Result<usize> {
        Ok(RuntimeSettings::max_concurrent(self))
    }
}

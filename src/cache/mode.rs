//! Cache Mode Module
//!
//! The process-wide switch selecting which backend serves reads and writes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AccessError;

// == Cache Mode ==
/// Backing mode of the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Entries live in process memory
    #[default]
    Memory,
    /// Entries are persisted as files under the cache directory
    File,
}

impl CacheMode {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            CacheMode::Memory => 0,
            CacheMode::File => 1,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CacheMode::File,
            _ => CacheMode::Memory,
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMode::Memory => write!(f, "memory"),
            CacheMode::File => write!(f, "file"),
        }
    }
}

impl FromStr for CacheMode {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheMode::Memory),
            "file" => Ok(CacheMode::File),
            other => Err(AccessError::InvalidRequest(format!(
                "Unknown cache mode '{}', expected 'memory' or 'file'",
                other
            ))),
        }
    }
}

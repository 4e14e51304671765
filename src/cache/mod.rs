//! Cache Module
//!
//! Provides TTL caching with interchangeable in-memory and file backends.

mod entry;
mod file;
mod memory;
mod mode;
mod stats;
mod store;


// Re-export public types
pub use entry::{CacheEntry, EntryInfo};
pub use file::{EntryHeader, FileBackend, FileCacheError};
pub use memory::MemoryBackend;
pub use mode::CacheMode;
pub use stats::CacheStats;
pub use store::{CacheSize, CacheStore};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 1024;

//! File Backend
//!
//! Persists one file per key under the cache directory. A file holds a JSON
//! header line followed by the JSON-encoded value:
//!
//! ```text
//! {"key":"books:42","stored_at_ms":1700000000000,"ttl_seconds":900,"size":5120}
//! <value bytes>
//! ```
//!
//! File names are the xxh3 hash of the key, so arbitrary keys map to safe
//! names. The header carries the real key to detect hash collisions and lets
//! listings and size reports skip the value entirely.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::entry::{current_timestamp_ms, is_expired_at};
use crate::cache::{CacheEntry, EntryInfo};

const ENTRY_EXTENSION: &str = "entry";
const TMP_EXTENSION: &str = "tmp";

/// Temporary files older than this belong to a writer that died or failed
/// and are swept by listings.
const STALE_TMP_AGE: Duration = Duration::from_secs(300);

// Distinguishes temporary files of concurrent writers of the same key.
static TMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// == File Cache Error ==
#[derive(Error, Debug)]
pub enum FileCacheError {
    #[error("cache file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("value cannot be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

// == Entry Header ==
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryHeader {
    pub key: String,
    pub stored_at_ms: u64,
    pub ttl_seconds: u64,
    pub size: u64,
}

impl EntryHeader {
    pub fn is_expired(&self) -> bool {
        is_expired_at(self.stored_at_ms, self.ttl_seconds, current_timestamp_ms())
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo::new(&self.key, self.stored_at_ms, self.ttl_seconds, self.size)
    }
}

// == File Backend ==
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{:016x}.{}", xxh3_64(key.as_bytes()), ENTRY_EXTENSION))
    }

    // == Read ==
    /// Loads the entry for `key`.
    ///
    /// Returns `Ok(None)` for absent files and for files owned by a colliding
    /// key. Corrupt files are deleted before the error is returned.
    pub async fn read<V: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CacheEntry<V>>, FileCacheError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let decoded = decode::<V>(&bytes).map_err(|reason| FileCacheError::Corrupt {
            path: path.clone(),
            reason,
        });

        let (header, value) = match decoded {
            Ok(parts) => parts,
            Err(err) => {
                let _ = fs::remove_file(&path).await;
                return Err(err);
            }
        };

        if header.key != key {
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            value,
            stored_at: header.stored_at_ms,
            ttl_seconds: header.ttl_seconds,
            size: header.size,
        }))
    }

    // == Write ==
    /// Writes the entry through a temporary file and an atomic rename.
    ///
    /// Returns the encoded size of the value.
    pub async fn write<V: Serialize>(
        &self,
        key: &str,
        value: &V,
        ttl_seconds: u64,
    ) -> Result<u64, FileCacheError> {
        let body = serde_json::to_vec(value)?;
        let header = EntryHeader {
            key: key.to_string(),
            stored_at_ms: current_timestamp_ms(),
            ttl_seconds,
            size: body.len() as u64,
        };

        let mut buf = serde_json::to_vec(&header)?;
        buf.push(b'\n');
        buf.extend_from_slice(&body);

        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let seq = TMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{}", seq, TMP_EXTENSION));
        if let Err(err) = write_and_rename(&tmp, &path, &buf).await {
            let _ = remove_path(&tmp).await;
            return Err(err.into());
        }

        Ok(header.size)
    }

    // == Remove ==
    pub async fn remove(&self, key: &str) -> Result<bool, FileCacheError> {
        remove_path(&self.path_for(key)).await
    }

    // == Headers ==
    /// Reads the header line of every entry file.
    ///
    /// Unreadable files are skipped and removed; a missing directory is an
    /// empty cache.
    pub async fn headers(&self) -> Result<Vec<(PathBuf, EntryHeader)>, FileCacheError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut headers = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(ENTRY_EXTENSION) => {}
                Some(TMP_EXTENSION) => {
                    remove_if_stale(&item, &path).await;
                    continue;
                }
                _ => continue,
            }

            match read_header(&path).await {
                Ok(header) => headers.push((path, header)),
                Err(err) => {
                    tracing::warn!("Dropping unreadable cache file: {}", err);
                    let _ = remove_path(&path).await;
                }
            }
        }

        Ok(headers)
    }

    /// Removes every entry whose header matches `predicate`.
    pub async fn remove_where<P>(&self, predicate: P) -> Result<usize, FileCacheError>
    where
        P: Fn(&EntryHeader) -> bool,
    {
        let mut removed = 0;
        for (path, header) in self.headers().await? {
            if predicate(&header) && remove_path(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

async fn remove_path(path: &Path) -> Result<bool, FileCacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

async fn write_and_rename(tmp: &Path, path: &Path, buf: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, buf).await?;
    fs::rename(tmp, path).await
}

/// Removes a leftover temporary file once it is older than [`STALE_TMP_AGE`].
async fn remove_if_stale(item: &fs::DirEntry, path: &Path) {
    let stale = match item.metadata().await.and_then(|meta| meta.modified()) {
        Ok(modified) => SystemTime::now()
            .duration_since(modified)
            .is_ok_and(|age| age > STALE_TMP_AGE),
        Err(_) => false,
    };
    if stale && remove_path(path).await.unwrap_or(false) {
        tracing::debug!("Removed stale temporary cache file {}", path.display());
    }
}

async fn read_header(path: &Path) -> Result<EntryHeader, FileCacheError> {
    let file = fs::File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    serde_json::from_str(line.trim_end()).map_err(|err| FileCacheError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<(EntryHeader, V), String> {
    let split = bytes
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| "missing header line".to_string())?;

    let header: EntryHeader =
        serde_json::from_slice(&bytes[..split]).map_err(|err| format!("header: {}", err))?;
    let body = &bytes[split + 1..];
    if body.len() as u64 != header.size {
        return Err(format!(
            "truncated value: expected {} bytes, found {}",
            header.size,
            body.len()
        ));
    }

    let value = serde_json::from_slice(body).map_err(|err| format!("value: {}", err))?;
    Ok((header, value))
}

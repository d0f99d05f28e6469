//! Keyed content cache for downloaded files.
//!
//! Keys are remote filenames. `FsCache` keeps files in an explicit directory
//! and never evicts; `MemoryCache` tracks entries in memory over a private
//! temporary directory and is meant for tests and one-off runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use covariate_common::{CovResult, CovariateError};
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache statistics.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_bytes_written: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Content-addressed store of downloaded files.
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Path of the cached file for `key`, if present.
    async fn get(&self, key: &str) -> Option<PathBuf>;

    /// Store `bytes` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, bytes: Bytes) -> CovResult<PathBuf>;

    async fn stats(&self) -> CacheStats;
}

/// Keys become file names, so they may not name directories.
fn validate_key(key: &str) -> CovResult<()> {
    if key.is_empty()
        || key.starts_with('.')
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
    {
        return Err(CovariateError::InvalidArgument(format!(
            "invalid cache key '{}'",
            key
        )));
    }
    Ok(())
}

/// Write through a temporary name so readers never see partial files.
async fn write_atomic(dir: &Path, key: &str, bytes: &[u8]) -> CovResult<PathBuf> {
    fs::create_dir_all(dir).await?;
    let final_path = dir.join(key);
    let temp_path = dir.join(format!(".{}.partial", key));
    fs::write(&temp_path, bytes).await?;
    fs::rename(&temp_path, &final_path).await?;
    Ok(final_path)
}

/// Directory-backed cache.
pub struct FsCache {
    dir: PathBuf,
    stats: Arc<Mutex<CacheStats>>,
}

impl FsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ContentCache for FsCache {
    async fn get(&self, key: &str) -> Option<PathBuf> {
        if validate_key(key).is_err() {
            return None;
        }
        let path = self.dir.join(key);
        let found = fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false);

        let mut stats = self.stats.lock().await;
        if found {
            stats.hits += 1;
            Some(path)
        } else {
            stats.misses += 1;
            None
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> CovResult<PathBuf> {
        validate_key(key)?;
        let path = write_atomic(&self.dir, key, &bytes).await?;

        let mut stats = self.stats.lock().await;
        stats.writes += 1;
        stats.total_bytes_written += bytes.len() as u64;
        debug!(key = key, bytes = bytes.len(), path = %path.display(), "Cached content");
        Ok(path)
    }

    async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }
}

/// In-memory index over a private temporary directory, removed on drop.
pub struct MemoryCache {
    dir: TempDir,
    entries: Mutex<HashMap<String, PathBuf>>,
    stats: Mutex<CacheStats>,
}

impl MemoryCache {
    pub fn new() -> CovResult<Self> {
        let dir = tempfile::Builder::new().prefix("covariate-cache-").tempdir()?;
        Ok(Self {
            dir,
            entries: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<PathBuf> {
        let found = self.entries.lock().await.get(key).cloned();
        let mut stats = self.stats.lock().await;
        match found {
            Some(path) => {
                stats.hits += 1;
                Some(path)
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> CovResult<PathBuf> {
        validate_key(key)?;
        let path = write_atomic(self.dir.path(), key, &bytes).await?;
        self.entries.lock().await.insert(key.to_string(), path.clone());

        let mut stats = self.stats.lock().await;
        stats.writes += 1;
        stats.total_bytes_written += bytes.len() as u64;
        Ok(path)
    }

    async fn stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }
}

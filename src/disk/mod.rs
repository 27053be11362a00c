//! Disk Cache Tier
//!
//! A flat directory of cache entries that expire a fixed time after their
//! last write.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         DiskCache                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  write_file("a/b") ──▶ OsFs("a_slash_b") + ExpiryIndex.touch  │
//! │                                                               │
//! │  sweeper task (every check_interval)                          │
//! │    ExpiryIndex.sweep_expired_with(now, OsFs.remove)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are stored under a single directory. A `/` in a name becomes
//! `_slash_` on disk, so names that already contain `_slash_` alias the
//! nested form.
//!
//! Expiry is driven only by writes: reads never extend an entry's life.

mod index;
mod proptest;

pub use index::ExpiryIndex;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::osfs::OsFs;
use crate::tier::{FileHandle, FileMode, Metadata, OpenOptions, Tier};

const SLASH: &str = "_slash_";

/// Disk cache configuration
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding the entries. `None` creates a fresh
    /// `diskcache_<uuid>` directory under the system temp dir.
    pub location: Option<PathBuf>,
    /// Entry lifetime after its last write
    pub ttl: Duration,
    /// How often expired entries are swept
    pub check_interval: Duration,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            location: None,
            ttl: Duration::from_secs(30 * 60),
            check_interval: Duration::from_secs(60),
        }
    }
}

/// Expiring on-disk cache tier
pub struct DiskCache {
    location: PathBuf,
    backend: Arc<OsFs>,
    index: Arc<ExpiryIndex>,
    config: DiskCacheConfig,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("location", &self.location)
            .field("entries", &self.index.len())
            .field("config", &self.config)
            .finish()
    }
}

impl DiskCache {
    /// Open a disk cache and start its sweeper.
    ///
    /// Entries already present in the location are adopted and expire one
    /// TTL from now. Must be called inside a tokio runtime.
    pub async fn new(config: DiskCacheConfig) -> Result<Self> {
        if config.check_interval.is_zero() {
            return Err(Error::Config("check_interval must be non-zero".to_string()));
        }
        let now = tokio::time::Instant::now();
        if now
            .checked_add(config.check_interval)
            .and_then(|first| first.checked_add(config.check_interval))
            .is_none()
        {
            return Err(Error::Config(format!(
                "check_interval {:?} is too large",
                config.check_interval
            )));
        }

        let location = match &config.location {
            Some(dir) => {
                let meta = match tokio::fs::metadata(dir).await {
                    Ok(meta) => meta,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(Error::invalid_path(
                            dir.display().to_string(),
                            "cache location does not exist",
                        ));
                    }
                    Err(e) => return Err(Error::Io(e)),
                };
                if !meta.is_dir() {
                    return Err(Error::invalid_path(
                        dir.display().to_string(),
                        "cache location is not a directory",
                    ));
                }
                dir.clone()
            }
            None => {
                let dir = std::env::temp_dir().join(format!("diskcache_{}", Uuid::new_v4()));
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| Error::from_io(dir.display().to_string(), e))?;
                dir
            }
        };

        let index = Arc::new(ExpiryIndex::new(config.ttl));
        let adopted = adopt_existing(&location, &index).await?;

        let backend = Arc::new(OsFs::new(&location));
        let shutdown = CancellationToken::new();
        let sweeper = tokio::spawn(run_sweeper(
            Arc::clone(&index),
            Arc::clone(&backend),
            config.check_interval,
            shutdown.clone(),
        ));

        info!(
            location = %location.display(),
            ttl = ?config.ttl,
            check_interval = ?config.check_interval,
            adopted,
            "disk cache opened"
        );

        Ok(Self {
            location,
            backend,
            index,
            config,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn config(&self) -> &DiskCacheConfig {
        &self.config
    }

    /// Expiry bookkeeping for the stored entries
    pub fn index(&self) -> &ExpiryIndex {
        &self.index
    }

    /// Sweep expired entries immediately. Returns how many were evicted.
    pub async fn sweep_now(&self) -> usize {
        sweep(&self.index, &self.backend, Instant::now()).await
    }

    /// Stop the sweeper and wait for it to exit. A sweep already in
    /// progress finishes first. Safe to call more than once.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "disk cache sweeper ended abnormally");
            }
            debug!(location = %self.location.display(), "disk cache closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// On-disk name for a cache entry
fn disk_name(name: &str) -> Result<String> {
    let trimmed = name.trim_start_matches("./").trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(Error::invalid_path(name, "empty cache entry name"));
    }
    Ok(trimmed.replace('/', SLASH))
}

/// Report errors against the caller's name rather than the flattened one
fn relabel(err: Error, name: &str) -> Error {
    match err {
        Error::NotFound { .. } => Error::not_found(name),
        Error::AlreadyExists { .. } => Error::already_exists(name),
        other => other,
    }
}

fn entry_name(name: &str) -> String {
    name.trim_start_matches("./").trim_start_matches('/').to_string()
}

async fn adopt_existing(location: &Path, index: &ExpiryIndex) -> Result<usize> {
    let mut dir = tokio::fs::read_dir(location)
        .await
        .map_err(|e| Error::from_io(location.display().to_string(), e))?;
    let mut adopted = 0;
    while let Some(entry) = dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().replace(SLASH, "/");
        index.touch(&name);
        adopted += 1;
    }
    Ok(adopted)
}

async fn sweep(index: &ExpiryIndex, backend: &OsFs, now: Instant) -> usize {
    let evicted = index
        .sweep_expired_with(now, |name| async move {
            let removed: Result<()> = match disk_name(&name) {
                Ok(on_disk) => backend.remove(&on_disk).await,
                Err(e) => Err(e),
            };
            match removed {
                Err(e) if e.is_not_found() => Ok(()),
                other => other,
            }
        })
        .await;
    if evicted > 0 {
        debug!(evicted, "disk cache sweep");
    }
    evicted
}

#[instrument(skip(index, backend, shutdown))]
async fn run_sweeper(
    index: Arc<ExpiryIndex>,
    backend: Arc<OsFs>,
    check_interval: Duration,
    shutdown: CancellationToken,
) {
    let start = tokio::time::Instant::now()
        .checked_add(check_interval)
        .unwrap_or_else(tokio::time::Instant::now);
    let mut tick = interval_at(start, check_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("disk cache sweeper shutting down");
                break;
            }
            _ = tick.tick() => {
                sweep(&index, &backend, Instant::now()).await;
            }
        }
    }
}

#[async_trait]
impl Tier for DiskCache {
    async fn open(&self, name: &str) -> Result<FileHandle> {
        self.backend
            .open(&disk_name(name)?)
            .await
            .map_err(|e| relabel(e, name))
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        self.backend
            .read_file(&disk_name(name)?)
            .await
            .map_err(|e| relabel(e, name))
    }

    async fn write_file(&self, name: &str, content: Bytes, mode: FileMode) -> Result<()> {
        let size = content.len();
        self.backend
            .write_file(&disk_name(name)?, content, mode)
            .await
            .map_err(|e| relabel(e, name))?;
        self.index.touch(&entry_name(name));
        debug!(name = %name, size, "disk cache stored entry");
        Ok(())
    }

    async fn stat(&self, name: &str) -> Result<Metadata> {
        let mut meta = self
            .backend
            .stat(&disk_name(name)?)
            .await
            .map_err(|e| relabel(e, name))?;
        meta.name = name.rsplit('/').next().unwrap_or(name).to_string();
        Ok(meta)
    }

    async fn open_file(
        &self,
        name: &str,
        mode: FileMode,
        options: OpenOptions,
    ) -> Result<FileHandle> {
        let handle = self
            .backend
            .open_file(&disk_name(name)?, mode, options)
            .await
            .map_err(|e| relabel(e, name))?;
        if options.is_write() {
            self.index.touch(&entry_name(name));
        }
        Ok(handle)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.backend
            .remove(&disk_name(name)?)
            .await
            .map_err(|e| relabel(e, name))?;
        self.index.remove(&entry_name(name));
        Ok(())
    }

    /// Remove the entry at `path` and every flattened entry beneath it
    async fn remove_all(&self, path: &str) -> Result<()> {
        let base = disk_name(path)?;
        let prefix = format!("{}{}", base, SLASH);

        let mut dir = tokio::fs::read_dir(&self.location)
            .await
            .map_err(|e| Error::from_io(self.location.display().to_string(), e))?;
        let mut removed = 0;
        while let Some(entry) = dir.next_entry().await? {
            let on_disk = entry.file_name().to_string_lossy().into_owned();
            if on_disk != base && !on_disk.starts_with(&prefix) {
                continue;
            }
            self.backend
                .remove_all(&on_disk)
                .await
                .map_err(|e| relabel(e, path))?;
            self.index.remove(&on_disk.replace(SLASH, "/"));
            removed += 1;
        }
        self.index.remove(&entry_name(path));

        debug!(path = %path, removed, "disk cache removed subtree");
        Ok(())
    }

    fn label(&self) -> String {
        format!("disk:{}", self.location.display())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::io::AsyncWriteExt;

    async fn cache_in(dir: &Path, ttl: Duration, check: Duration) -> DiskCache {
        DiskCache::new(DiskCacheConfig {
            location: Some(dir.to_path_buf()),
            ttl,
            check_interval: check,
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_disk_name() {
        assert_eq!(disk_name("a/b/c").unwrap(), "a_slash_b_slash_c");
        assert_eq!(disk_name("/a").unwrap(), "a");
        assert_matches!(disk_name("/"), Err(Error::InvalidPath { .. }));
    }

    #[test]
    fn test_default_config() {
        let config = DiskCacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(1800));
        assert_eq!(config.check_interval, Duration::from_secs(60));
        assert!(config.location.is_none());
    }

    #[tokio::test]
    async fn test_write_read_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;

        cache
            .write_file("x/y.txt", Bytes::from("data"), FileMode::DEFAULT)
            .await
            .unwrap();

        assert!(dir.path().join("x_slash_y.txt").is_file());
        assert_eq!(cache.read_file("x/y.txt").await.unwrap(), "data");
        let meta = cache.stat("x/y.txt").await.unwrap();
        assert_eq!(meta.name, "y.txt");
        assert_eq!(meta.size, 4);
        assert!(cache.index().contains("x/y.txt"));
        cache.close().await;
    }

    #[tokio::test]
    async fn test_write_overwrites_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;

        cache
            .write_file("f", Bytes::from("one"), FileMode::DEFAULT)
            .await
            .unwrap();
        let first = cache.index().expires_at("f").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache
            .write_file("f", Bytes::from("two"), FileMode::DEFAULT)
            .await
            .unwrap();

        assert_eq!(cache.read_file("f").await.unwrap(), "two");
        assert!(cache.index().expires_at("f").unwrap() > first);
        assert_eq!(cache.index().len(), 1);
        cache.close().await;
    }

    #[tokio::test]
    async fn test_missing_reports_caller_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;
        assert_matches!(
            cache.read_file("a/b").await,
            Err(Error::NotFound { ref path }) if path == "a/b"
        );
        cache.close().await;
    }

    #[tokio::test]
    async fn test_sweep_now_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_millis(10), Duration::from_secs(60)).await;

        cache
            .write_file("gone", Bytes::from("x"), FileMode::DEFAULT)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.sweep_now().await, 1);
        assert_matches!(cache.stat("gone").await, Err(Error::NotFound { .. }));
        assert!(cache.index().is_empty());
        cache.close().await;
    }

    #[tokio::test]
    async fn test_background_sweep_evicts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_millis(20), Duration::from_millis(10)).await;

        cache
            .write_file("e", Bytes::from("x"), FileMode::DEFAULT)
            .await
            .unwrap();
        assert!(cache.stat("e").await.is_ok());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_matches!(cache.stat("e").await, Err(Error::NotFound { .. }));
        cache.close().await;
    }

    #[tokio::test]
    async fn test_remove_drops_index_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;
        cache
            .write_file("r", Bytes::from("x"), FileMode::DEFAULT)
            .await
            .unwrap();

        cache.remove("r").await.unwrap();
        assert!(!cache.index().contains("r"));
        assert_matches!(cache.remove("r").await, Err(Error::NotFound { .. }));
        cache.remove_all("r").await.unwrap();
        cache.close().await;
    }

    #[tokio::test]
    async fn test_adopts_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old_slash_entry"), b"left over").unwrap();

        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;
        assert!(cache.index().contains("old/entry"));
        assert_eq!(cache.read_file("old/entry").await.unwrap(), "left over");
        cache.close().await;
    }

    #[tokio::test]
    async fn test_location_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"").unwrap();

        let res = DiskCache::new(DiskCacheConfig {
            location: Some(file),
            ..Default::default()
        })
        .await;
        assert_matches!(res, Err(Error::InvalidPath { .. }));

        let res = DiskCache::new(DiskCacheConfig {
            location: Some(dir.path().join("missing")),
            ..Default::default()
        })
        .await;
        assert_matches!(res, Err(Error::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_default_location_is_fresh_temp_dir() {
        let cache = DiskCache::new(DiskCacheConfig::default()).await.unwrap();
        let location = cache.location().to_path_buf();
        assert!(location.is_dir());
        assert!(location
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("diskcache_"));
        cache.close().await;
        std::fs::remove_dir_all(location).unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_millis(5)).await;
        cache.close().await;
        cache.close().await;
        assert!(cache.is_closed());
        // Still usable as storage after the sweeper stops.
        cache
            .write_file("k", Bytes::from("v"), FileMode::DEFAULT)
            .await
            .unwrap();
        assert_eq!(cache.read_file("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn test_zero_check_interval_rejected() {
        let res = DiskCache::new(DiskCacheConfig {
            check_interval: Duration::ZERO,
            ..Default::default()
        })
        .await;
        assert_matches!(res, Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_oversized_check_interval_rejected() {
        let res = DiskCache::new(DiskCacheConfig {
            check_interval: Duration::MAX,
            ..Default::default()
        })
        .await;
        assert_matches!(res, Err(Error::Config(_)));
    }

    #[tokio::test]
    async fn test_huge_ttl_write_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::MAX, Duration::from_millis(5)).await;
        cache
            .write_file("kept", Bytes::from("v"), FileMode::DEFAULT)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.sweep_now().await, 0);
        assert!(cache.index().contains("kept"));
        assert_eq!(cache.read_file("kept").await.unwrap(), "v");
        cache.close().await;
    }

    #[tokio::test]
    async fn test_open_for_write_touches_index() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;

        let mut handle = cache
            .open_file("w/x", FileMode::DEFAULT, OpenOptions::write_create())
            .await
            .unwrap();
        assert!(cache.index().contains("w/x"));
        handle.write_all(b"through handle").await.unwrap();
        handle.shutdown().await.unwrap();
        drop(handle);

        assert_eq!(cache.read_file("w/x").await.unwrap(), "through handle");
        cache.close().await;
    }

    #[tokio::test]
    async fn test_open_for_read_does_not_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;
        cache
            .write_file("r", Bytes::from("x"), FileMode::DEFAULT)
            .await
            .unwrap();
        let written = cache.index().expires_at("r").unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let handle = cache
            .open_file("r", FileMode::DEFAULT, OpenOptions::read_only())
            .await
            .unwrap();
        drop(handle);
        cache.open("r").await.unwrap();

        assert_eq!(cache.index().expires_at("r"), Some(written));
        cache.close().await;
    }

    #[tokio::test]
    async fn test_remove_all_drops_flattened_children() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path(), Duration::from_secs(60), Duration::from_secs(60)).await;
        for name in ["dir/x", "dir/sub/y", "dirt", "other/z"] {
            cache
                .write_file(name, Bytes::from("old"), FileMode::DEFAULT)
                .await
                .unwrap();
        }

        cache.remove_all("dir").await.unwrap();

        assert_matches!(cache.read_file("dir/x").await, Err(Error::NotFound { .. }));
        assert_matches!(cache.read_file("dir/sub/y").await, Err(Error::NotFound { .. }));
        assert!(!cache.index().contains("dir/x"));
        assert!(!cache.index().contains("dir/sub/y"));
        assert_eq!(cache.read_file("dirt").await.unwrap(), "old");
        assert_eq!(cache.read_file("other/z").await.unwrap(), "old");
        assert_eq!(cache.index().len(), 2);
        cache.close().await;
    }
}

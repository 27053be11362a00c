//! Two-tier read-through composition

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use super::metrics::{FillMetrics, FillMetricsSnapshot};
use crate::error::{Error, Result};
use crate::tier::{FileHandle, FileMode, Metadata, OpenOptions, Tier};

/// Composition configuration
#[derive(Debug, Clone)]
pub struct CacheFsConfig {
    /// Record which tier satisfied the most recent read
    pub fill_attribution: bool,
    /// Mode used when back-filling the cache tier
    pub backfill_mode: FileMode,
}

impl Default for CacheFsConfig {
    fn default() -> Self {
        Self {
            fill_attribution: false,
            backfill_mode: FileMode::DEFAULT,
        }
    }
}

/// A cache tier layered over a store tier.
///
/// Reads try the cache first and fall through to the store; a store hit is
/// written back into the cache by a background job. Writes go to the store
/// only. `CacheFs` is itself a [`Tier`], so chains of any depth are built
/// by nesting.
pub struct CacheFs<C, S> {
    cache: Arc<C>,
    store: Arc<S>,
    config: CacheFsConfig,
    fills: TaskTracker,
    accepting: Mutex<bool>,
    last_fill: Mutex<Option<String>>,
    metrics: Arc<FillMetrics>,
}

impl<C, S> CacheFs<C, S>
where
    C: Tier + 'static,
    S: Tier + 'static,
{
    pub fn new(cache: C, store: S) -> Self {
        Self::with_config(cache, store, CacheFsConfig::default())
    }

    pub fn with_config(cache: C, store: S, config: CacheFsConfig) -> Self {
        let cache = Arc::new(cache);
        let store = Arc::new(store);

        if let Some(filler) = cache.as_set_filler() {
            filler.set_filler(Arc::clone(&store) as Arc<dyn Tier>);
            debug!(
                cache = %cache.label(),
                store = %store.label(),
                "registered store as cache filler"
            );
        }

        Self {
            cache,
            store,
            config,
            fills: TaskTracker::new(),
            accepting: Mutex::new(true),
            last_fill: Mutex::new(None),
            metrics: Arc::new(FillMetrics::new()),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CacheFsConfig {
        &self.config
    }

    pub fn metrics(&self) -> FillMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Tier that satisfied the most recent `read_file`, when attribution is
    /// enabled. Nested compositions report their own source.
    pub fn last_fill(&self) -> Option<String> {
        self.last_fill.lock().clone()
    }

    /// Wait until every back-fill started so far has finished
    pub async fn wait_for_fills(&self) {
        self.fills.close();
        self.fills.wait().await;
        // Same lock as close(): never reopen after it.
        let accepting = self.accepting.lock();
        if *accepting {
            self.fills.reopen();
        }
    }

    /// Stop starting back-fills and wait for the running ones. Reads keep
    /// working afterwards without filling the cache.
    pub async fn close(&self) {
        {
            let mut accepting = self.accepting.lock();
            *accepting = false;
            self.fills.close();
        }
        self.fills.wait().await;
        debug!(tier = %self.label(), "cache composition closed");
    }

    pub fn is_closed(&self) -> bool {
        !*self.accepting.lock()
    }

    fn attribute(&self, tier: &dyn Tier) {
        if self.config.fill_attribution {
            let source = tier.fill_source().unwrap_or_else(|| tier.label());
            *self.last_fill.lock() = Some(source);
        }
    }

    fn schedule_backfill(&self, name: &str, content: Bytes) {
        let accepting = self.accepting.lock();
        if !*accepting {
            self.metrics.record_backfill_skipped();
            trace!(name = %name, "composition closed, skipping back-fill");
            return;
        }

        self.metrics.record_backfill_scheduled();
        let cache = Arc::clone(&self.cache);
        let metrics = Arc::clone(&self.metrics);
        let mode = self.config.backfill_mode;
        let name = name.to_string();

        self.fills.spawn(async move {
            match cache.write_file(&name, content, mode).await {
                Ok(()) => {
                    metrics.record_backfill_completed();
                    debug!(name = %name, cache = %cache.label(), "back-filled cache tier");
                }
                // A concurrent reader filled it first.
                Err(Error::AlreadyExists { .. }) => {
                    metrics.record_backfill_completed();
                    trace!(name = %name, "cache tier already filled");
                }
                Err(e) => {
                    metrics.record_backfill_failed();
                    warn!(name = %name, cache = %cache.label(), error = %e, "back-fill failed");
                }
            }
        });
    }

    /// Drop a stale copy from the cache tier after the store changed
    async fn invalidate(&self, name: &str, recursive: bool) {
        let res = if recursive {
            self.cache.remove_all(name).await
        } else {
            self.cache.remove(name).await
        };
        match res {
            Ok(()) | Err(Error::NotFound { .. }) | Err(Error::Unsupported { .. }) => {}
            Err(e) => debug!(name = %name, error = %e, "cache invalidation failed"),
        }
    }
}

#[async_trait]
impl<C, S> Tier for CacheFs<C, S>
where
    C: Tier + 'static,
    S: Tier + 'static,
{
    async fn open(&self, name: &str) -> Result<FileHandle> {
        match self.cache.open(name).await {
            Ok(handle) => return Ok(handle),
            Err(e) if !e.is_not_found() => {
                debug!(name = %name, error = %e, "cache open failed, using store");
            }
            Err(_) => {}
        }
        self.store.open(name).await
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        match self.cache.read_file(name).await {
            Ok(content) => {
                self.metrics.record_cache_hit();
                self.attribute(&*self.cache);
                return Ok(content);
            }
            Err(e) => {
                self.metrics.record_cache_miss();
                if !e.is_not_found() {
                    debug!(name = %name, error = %e, "cache read failed, using store");
                }
            }
        }

        let start = Instant::now();
        let content = match self.store.read_file(name).await {
            Ok(content) => content,
            Err(e) => {
                self.metrics.record_store_miss();
                return Err(e);
            }
        };
        self.metrics.record_store_hit();
        self.metrics.record_store_read_latency(start.elapsed());
        self.attribute(&*self.store);

        self.schedule_backfill(name, content.clone());
        Ok(content)
    }

    async fn write_file(&self, name: &str, content: Bytes, mode: FileMode) -> Result<()> {
        self.store.write_file(name, content, mode).await
    }

    async fn stat(&self, name: &str) -> Result<Metadata> {
        match self.cache.stat(name).await {
            Ok(meta) => Ok(meta),
            Err(_) => self.store.stat(name).await,
        }
    }

    async fn open_file(
        &self,
        name: &str,
        mode: FileMode,
        options: OpenOptions,
    ) -> Result<FileHandle> {
        self.store.open_file(name, mode, options).await
    }

    async fn mkdir_all(&self, path: &str, mode: FileMode) -> Result<()> {
        self.store.mkdir_all(path, mode).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.store.remove(name).await?;
        self.invalidate(name, false).await;
        Ok(())
    }

    async fn remove_all(&self, path: &str) -> Result<()> {
        self.store.remove_all(path).await?;
        self.invalidate(path, true).await;
        Ok(())
    }

    fn label(&self) -> String {
        format!("cache({} -> {})", self.cache.label(), self.store.label())
    }

    fn fill_source(&self) -> Option<String> {
        self.last_fill()
    }
}

// =============================================================================
// Tests
// =============================================================================

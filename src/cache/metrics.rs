//! Fill Metrics
//!
//! Counters describing how reads through a composition were satisfied and
//! what happened to the back-fills they triggered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Fill metrics collector
#[derive(Debug, Default)]
pub struct FillMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    store_hits: AtomicU64,
    store_misses: AtomicU64,

    // Store read latency (microseconds, exponential moving average)
    store_read_latency_us: AtomicU64,

    backfills_scheduled: AtomicU64,
    backfills_completed: AtomicU64,
    backfills_failed: AtomicU64,
    backfills_skipped: AtomicU64,
}

impl FillMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_hit(&self) {
        self.store_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_miss(&self) {
        self.store_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_read_latency(&self, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1; // EMA smoothing factor

        loop {
            let current = self.store_read_latency_us.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if self
                .store_read_latency_us
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn record_backfill_scheduled(&self) {
        self.backfills_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill_completed(&self) {
        self.backfills_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill_failed(&self) {
        self.backfills_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A miss was served after close, so no back-fill was started
    pub fn record_backfill_skipped(&self) {
        self.backfills_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn store_hits(&self) -> u64 {
        self.store_hits.load(Ordering::Relaxed)
    }

    pub fn store_misses(&self) -> u64 {
        self.store_misses.load(Ordering::Relaxed)
    }

    pub fn store_read_latency(&self) -> Duration {
        Duration::from_micros(self.store_read_latency_us.load(Ordering::Relaxed))
    }

    /// Fraction of successful reads served by the cache tier
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.cache_hits() as f64;
        let total = hits + self.store_hits() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> FillMetricsSnapshot {
        FillMetricsSnapshot {
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            store_hits: self.store_hits(),
            store_misses: self.store_misses(),
            store_read_latency: self.store_read_latency(),
            backfills_scheduled: self.backfills_scheduled.load(Ordering::Relaxed),
            backfills_completed: self.backfills_completed.load(Ordering::Relaxed),
            backfills_failed: self.backfills_failed.load(Ordering::Relaxed),
            backfills_skipped: self.backfills_skipped.load(Ordering::Relaxed),
            hit_ratio: self.hit_ratio(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.store_hits.store(0, Ordering::Relaxed);
        self.store_misses.store(0, Ordering::Relaxed);
        self.store_read_latency_us.store(0, Ordering::Relaxed);
        self.backfills_scheduled.store(0, Ordering::Relaxed);
        self.backfills_completed.store(0, Ordering::Relaxed);
        self.backfills_failed.store(0, Ordering::Relaxed);
        self.backfills_skipped.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`FillMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct FillMetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub store_hits: u64,
    pub store_misses: u64,
    pub store_read_latency: Duration,
    pub backfills_scheduled: u64,
    pub backfills_completed: u64,
    pub backfills_failed: u64,
    pub backfills_skipped: u64,
    pub hit_ratio: f64,
}

impl FillMetricsSnapshot {
    /// Back-fills scheduled but not yet finished when the snapshot was taken
    pub fn backfills_in_flight(&self) -> u64 {
        self.backfills_scheduled
            .saturating_sub(self.backfills_completed + self.backfills_failed)
    }
}

//! Expiry Index
//!
//! Ordered-by-expiry index over cache entry names.
//!
//! # Design
//!
//! - `BTreeSet<(Instant, String)>` ordered by expiry, so a sweep is a prefix scan
//! - `HashMap<String, Instant>` for O(1) existence checks and to find the
//!   ordered entry to replace on refresh
//! - One `parking_lot::Mutex` over both; no I/O while it is held

use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Entries {
    ordered: BTreeSet<(Instant, String)>,
    by_name: HashMap<String, Instant>,
}

/// Time-to-live index keyed by entry name
#[derive(Debug)]
pub struct ExpiryIndex {
    ttl: Duration,
    entries: Mutex<Entries>,
}

impl ExpiryIndex {
    /// Create an empty index whose entries live for `ttl` after their last touch
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert `name` or push its expiry forward, as of now
    pub fn touch(&self, name: &str) {
        self.touch_at(name, Instant::now());
    }

    /// Insert `name` or push its expiry to `now + ttl`, clamped to the
    /// latest representable instant
    pub fn touch_at(&self, name: &str, now: Instant) {
        let expires_at = deadline(now, self.ttl);
        let mut entries = self.entries.lock();

        if let Some(old) = entries.by_name.insert(name.to_string(), expires_at) {
            if !entries.ordered.remove(&(old, name.to_string())) {
                error!(name = %name, "expiry index out of sync: named entry had no ordered entry");
            }
        }
        entries.ordered.insert((expires_at, name.to_string()));
    }

    /// Drop `name` from the index. Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.by_name.remove(name) {
            Some(at) => {
                entries.ordered.remove(&(at, name.to_string()));
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().by_name.contains_key(name)
    }

    /// When `name` expires, if indexed
    pub fn expires_at(&self, name: &str) -> Option<Instant> {
        self.entries.lock().by_name.get(name).copied()
    }

    /// Number of live ordered entries
    pub fn len(&self) -> usize {
        self.entries.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach every entry with expiry `<= now`, oldest first, and return
    /// their names. Stops at the first unexpired entry.
    pub fn sweep_expired(&self, now: Instant) -> Vec<String> {
        let mut entries = self.entries.lock();
        let mut expired = Vec::new();

        loop {
            match entries.ordered.first() {
                Some((at, _)) if *at <= now => {}
                _ => break,
            }
            let Some((_, name)) = entries.ordered.pop_first() else {
                break;
            };
            if entries.by_name.remove(&name).is_none() {
                error!(name = %name, "expiry index out of sync: ordered entry had no named entry");
            }
            expired.push(name);
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), remaining = entries.ordered.len(), "swept expired entries");
        }
        expired
    }

    /// Sweep, then await `on_expired` for every detached name outside the
    /// lock. Callback failures are logged and do not stop the sweep. Returns
    /// the number of entries removed from the index.
    pub async fn sweep_expired_with<F, Fut, E>(&self, now: Instant, mut on_expired: F) -> usize
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        let expired = self.sweep_expired(now);
        let count = expired.len();
        for name in expired {
            let label = name.clone();
            if let Err(e) = on_expired(name).await {
                warn!(name = %label, error = %e, "failed to remove expired entry");
            }
        }
        count
    }

    /// Check that both views of the index agree
    pub fn verify(&self) -> Result<()> {
        let entries = self.entries.lock();
        if entries.ordered.len() != entries.by_name.len() {
            return Err(Error::Invariant(format!(
                "expiry index has {} ordered and {} named entries",
                entries.ordered.len(),
                entries.by_name.len()
            )));
        }
        for (at, name) in &entries.ordered {
            if entries.by_name.get(name) != Some(at) {
                return Err(Error::Invariant(format!(
                    "expiry index entry {} disagrees between views",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// `now + ttl`, halving `ttl` until the sum fits in an `Instant`
fn deadline(now: Instant, ttl: Duration) -> Instant {
    let mut ttl = ttl;
    loop {
        if let Some(at) = now.checked_add(ttl) {
            return at;
        }
        ttl /= 2;
    }
}

// =============================================================================
// Tests
// =============================================================================

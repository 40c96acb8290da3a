//! Time-boxed scan result cache.
//!
//! Entries are keyed by the canonical scan key (see
//! [`ScanPlan::cache_key`](crate::scanner::ScanPlan::cache_key)) and hold an
//! immutable [`ScanResult`] behind an `Arc`. Replacing an entry swaps the whole
//! value; nothing is mutated in place. An expired entry is never served: reads
//! treat it as a miss and drop it.

use crate::scanner::ScanResult;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<ScanResult>,
    symbol: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent TTL cache of scan results.
#[derive(Debug)]
pub struct ScanCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ScanCache {
    /// Creates an empty cache.
    ///
    /// # Arguments
    /// * `ttl` - Lifetime of each entry from insertion.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live entry for `key`, dropping it if it has expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<ScanResult>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(Arc::clone(&entry.value)),
            Some(_) => true,
            None => false,
        };

        if expired {
            // Only remove if still expired; a concurrent insert may have replaced it.
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(Instant::now()));
            debug!("Cache entry {} expired", short(key));
        }
        None
    }

    /// Stores a result under `key`, replacing any previous entry.
    pub fn insert(&self, key: String, value: Arc<ScanResult>) {
        let entry = CacheEntry {
            symbol: value.symbol.clone(),
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(key, entry);
    }

    /// Removes one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry for a symbol, whatever its filters. Returns the count removed.
    pub fn invalidate_symbol(&self, symbol: &str) -> usize {
        let symbol = symbol.trim().to_ascii_uppercase();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.symbol != symbol);
        before.saturating_sub(self.entries.len())
    }

    /// Removes everything. Returns the count removed.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Drops expired entries. Returns the count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

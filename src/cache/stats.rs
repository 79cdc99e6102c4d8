//! Cache counters and their snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Absent and hard-expired reads
    pub misses: u64,
    /// Entries removed to make room for a new key
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
    pub refreshes_scheduled: u64,
    pub refresh_failures: u64,
    /// Hard-expired entries purged after their stale retention elapsed
    pub expirations: u64,
    /// Past-expiry values handed out for degraded reads
    pub stale_reads: u64,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) refreshes_scheduled: AtomicU64,
    pub(crate) refresh_failures: AtomicU64,
    pub(crate) expirations: AtomicU64,
    pub(crate) stale_reads: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize, max_size: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            size,
            max_size,
            refreshes_scheduled: self.refreshes_scheduled.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            stale_reads: self.stale_reads.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

//! # Intelligent Cache
//!
//! Capacity-bounded TTL cache of lookup results keyed by [`RequestKey`].
//!
//! - Expiry and refresh-ahead thresholds are absolute instants fixed at
//!   insertion, read against the injected clock.
//! - When an insert would exceed `max_size`, the least-recently-used entry is
//!   evicted. Recency is updated on every successful `get`.
//! - A read inside the refresh-ahead window returns the current value and
//!   schedules at most one background refresh for that entry. A failed
//!   refresh leaves the entry untouched, and a refresh that completes after
//!   `invalidate` or `clear` is discarded.
//! - Hard-expired entries are invisible to `get` but kept for
//!   `stale_retention` so degraded reads can still use them through
//!   [`IntelligentCache::get_stale`].
//!
//! All read-modify-write sequences run under a single mutex owned by the
//! cache instance.

mod entry;
mod stats;

pub use stats::CacheStats;

use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::error::LookupResult;
use crate::events::{ResilienceEvent, SharedEventSink};
use crate::request_key::RequestKey;
use chrono::Utc;
use entry::CacheEntry;
use parking_lot::Mutex;
use stats::CacheCounters;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Value returned by a successful [`IntelligentCache::get`]
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<V> {
    pub value: V,
    /// The entry is inside its refresh-ahead window
    pub soft_expired: bool,
}

/// Past-expiry value returned by [`IntelligentCache::get_stale`]
#[derive(Debug, Clone, PartialEq)]
pub struct StaleValue<V> {
    pub value: V,
    /// Whether the entry is past its hard expiry
    pub expired: bool,
    pub age: Duration,
}

struct CacheState<V> {
    entries: HashMap<RequestKey, CacheEntry<V>>,
    /// Recency index: tick -> key, oldest first
    lru: BTreeMap<u64, RequestKey>,
    next_tick: u64,
    next_claim: u64,
    /// Keys with a refresh task currently running, mapped to that task's
    /// claim. Invalidation drops the claim so a late result is discarded.
    refreshing: HashMap<RequestKey, u64>,
}

impl<V> CacheState<V> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &RequestKey) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<RequestKey> {
        let (_, key) = self.lru.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

struct CacheInner<V> {
    config: CacheConfig,
    clock: SharedClock,
    sink: SharedEventSink,
    state: Mutex<CacheState<V>>,
    counters: CacheCounters,
}

/// TTL + LRU cache with refresh-ahead. Cloning shares the underlying store.
pub struct IntelligentCache<V> {
    inner: Arc<CacheInner<V>>,
}

impl<V> Clone for IntelligentCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for IntelligentCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntelligentCache")
            .field("config", &self.inner.config)
            .field("size", &self.inner.state.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl<V> IntelligentCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: CacheConfig, clock: SharedClock, sink: SharedEventSink) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    entries: HashMap::with_capacity(config.max_size.min(4096)),
                    lru: BTreeMap::new(),
                    next_tick: 0,
                    next_claim: 0,
                    refreshing: HashMap::new(),
                }),
                config,
                clock,
                sink,
                counters: CacheCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return the value for `key` if present and not hard-expired
    pub fn get(&self, key: &RequestKey) -> Option<CacheLookup<V>> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        let tick = state.tick();
        let state = &mut *state;

        let Some(entry) = state.entries.get_mut(key) else {
            CacheCounters::incr(&self.inner.counters.misses);
            debug!(key = %key, "Cache miss");
            return None;
        };

        if entry.is_expired(now) {
            CacheCounters::incr(&self.inner.counters.misses);
            debug!(key = %key, "Cache miss (hard-expired)");
            return None;
        }

        state.lru.remove(&entry.tick);
        entry.touch(now, tick);
        state.lru.insert(tick, key.clone());
        CacheCounters::incr(&self.inner.counters.hits);

        let soft_expired = entry.is_soft_expired(now);
        debug!(key = %key, soft_expired = soft_expired, "Cache hit");
        Some(CacheLookup {
            value: entry.value.clone(),
            soft_expired,
        })
    }

    /// `get`, scheduling one background refresh when the entry is inside its
    /// refresh-ahead window. `refresher` only runs if a refresh is scheduled.
    pub fn get_with_refresh<F, Fut>(&self, key: &RequestKey, refresher: F) -> Option<CacheLookup<V>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LookupResult<V>> + Send + 'static,
    {
        let lookup = self.get(key)?;
        if lookup.soft_expired {
            if let Some(claim) = self.try_start_refresh(key) {
                self.spawn_refresh(key.clone(), claim, refresher);
            }
        }
        Some(lookup)
    }

    /// Claim the refresh for `key`. `None` if this entry was already refreshed
    /// or a refresh is in flight.
    fn try_start_refresh(&self, key: &RequestKey) -> Option<u64> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        let state = &mut *state;

        if state.refreshing.contains_key(key) {
            return None;
        }
        let entry = state.entries.get_mut(key)?;
        if !entry.is_soft_expired(now) || entry.refresh_scheduled {
            return None;
        }
        entry.refresh_scheduled = true;
        state.next_claim += 1;
        let claim = state.next_claim;
        state.refreshing.insert(key.clone(), claim);
        Some(claim)
    }

    /// Release `claim` if it still holds the key
    fn finish_refresh(&self, key: &RequestKey, claim: u64) {
        let mut state = self.inner.state.lock();
        if state.refreshing.get(key) == Some(&claim) {
            state.refreshing.remove(key);
        }
    }

    /// Store a refreshed value unless the entry was invalidated while the
    /// refresh ran. Returns whether the value was stored.
    fn complete_refresh(&self, key: &RequestKey, claim: u64, value: V) -> bool {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        if state.refreshing.get(key) != Some(&claim) {
            return false;
        }
        state.refreshing.remove(key);
        let ttl = state
            .entries
            .get(key)
            .map_or(self.inner.config.default_ttl(), |entry| entry.ttl);
        self.insert_locked(&mut state, key.clone(), value, ttl, now);
        true
    }

    fn spawn_refresh<F, Fut>(&self, key: RequestKey, claim: u64, refresher: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LookupResult<V>> + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %key, "No async runtime available, skipping background refresh");
            self.finish_refresh(&key, claim);
            return;
        };

        CacheCounters::incr(&self.inner.counters.refreshes_scheduled);
        debug!(key = %key, "Background refresh scheduled");

        let cache = self.clone();
        handle.spawn(async move {
            match refresher().await {
                Ok(value) => {
                    if cache.complete_refresh(&key, claim, value) {
                        debug!(key = %key, "Background refresh completed");
                    } else {
                        debug!(key = %key, "Entry invalidated during refresh, discarding result");
                    }
                }
                Err(error) => {
                    CacheCounters::incr(&cache.inner.counters.refresh_failures);
                    warn!(key = %key, error = %error, "Background refresh failed, keeping existing entry");
                    cache.inner.sink.record(ResilienceEvent::RefreshFailed {
                        key: key.to_string(),
                        error: error.to_string(),
                        at: Utc::now(),
                    });
                    cache.finish_refresh(&key, claim);
                }
            }
        });
    }

    /// Last-known value for `key`, including hard-expired entries still
    /// inside their stale retention. Does not affect recency or hit/miss counts.
    pub fn get_stale(&self, key: &RequestKey) -> Option<StaleValue<V>> {
        let now = self.inner.clock.now();
        let state = self.inner.state.lock();
        let entry = state.entries.get(key)?;

        let expired = entry.is_expired(now);
        if expired && entry.is_past_retention(now, self.inner.config.stale_retention()) {
            return None;
        }

        CacheCounters::incr(&self.inner.counters.stale_reads);
        Some(StaleValue {
            value: entry.value.clone(),
            expired,
            age: entry.age(now),
        })
    }

    /// Insert or replace with the default TTL
    pub fn set(&self, key: RequestKey, value: V) {
        let ttl = self.inner.config.default_ttl();
        self.set_with_ttl(key, value, ttl);
    }

    /// Insert or replace with an explicit TTL, evicting the least-recently-used
    /// entry when a new key would exceed capacity
    pub fn set_with_ttl(&self, key: RequestKey, value: V, ttl: Duration) {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        self.insert_locked(&mut state, key, value, ttl, now);
    }

    fn insert_locked(&self, state: &mut CacheState<V>, key: RequestKey, value: V, ttl: Duration, now: Instant) {
        let tick = state.tick();

        let replaced = state.remove(&key).is_some();
        if !replaced {
            while state.entries.len() >= self.inner.config.max_size {
                match state.evict_lru() {
                    Some(evicted) => {
                        CacheCounters::incr(&self.inner.counters.evictions);
                        debug!(evicted = %evicted, "Evicted least-recently-used entry");
                    }
                    None => break,
                }
            }
        }

        let entry = CacheEntry::new(value, ttl, self.inner.config.refresh_threshold, now, tick);
        state.lru.insert(tick, key.clone());
        state.entries.insert(key, entry);
    }

    /// Remove `key`; returns whether an entry was present. A refresh in flight
    /// for the key is abandoned.
    pub fn invalidate(&self, key: &RequestKey) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            state.refreshing.remove(key);
            state.remove(key).is_some()
        };
        if removed {
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let cleared = state.entries.len();
        state.entries.clear();
        state.lru.clear();
        state.refreshing.clear();
        debug!(cleared = cleared, "Cache cleared");
    }

    /// Drop hard-expired entries whose stale retention has elapsed.
    /// Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let retention = self.inner.config.stale_retention();
        let mut state = self.inner.state.lock();

        let doomed: Vec<RequestKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_past_retention(now, retention))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &doomed {
            state.remove(key);
        }

        if !doomed.is_empty() {
            CacheCounters::add(&self.inner.counters.expirations, doomed.len() as u64);
            debug!(purged = doomed.len(), "Purged expired cache entries");
        }
        doomed.len()
    }

    /// Whether `key` has a live (not hard-expired) entry
    pub fn contains_key(&self, key: &RequestKey) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Number of stored entries, including expired ones awaiting purge
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        self.inner.counters.snapshot(size, self.inner.config.max_size)
    }

    /// Hand the current statistics to the event sink
    pub fn emit_stats(&self) {
        self.inner.sink.record(ResilienceEvent::CacheStats {
            stats: self.stats(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ClassifiedError;
    use crate::events::MemoryEventSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(max_size: usize) -> (IntelligentCache<String>, Arc<ManualClock>, Arc<MemoryEventSink>) {
        let clock = ManualClock::new();
        let sink = MemoryEventSink::new(32);
        let config = CacheConfig {
            max_size,
            default_ttl_ms: 100,
            refresh_threshold: 0.2,
            stale_retention_seconds: 10,
        };
        (IntelligentCache::new(config, clock.clone(), sink.clone()), clock, sink)
    }

    fn key(s: &str) -> RequestKey {
        RequestKey::from(s)
    }

    #[test]
    fn test_ttl_boundary() {
        let (cache, clock, _) = cache(10);
        cache.set(key("a"), "v".to_string());

        clock.advance(Duration::from_millis(99));
        assert_eq!(cache.get(&key("a")).map(|l| l.value), Some("v".to_string()));

        clock.advance(Duration::from_millis(2));
        assert!(cache.get(&key("a")).is_none());
        assert!(!cache.contains_key(&key("a")));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_lru_eviction_uses_recency() {
        let (cache, _, _) = cache(2);
        cache.set(key("a"), "1".to_string());
        cache.set(key("b"), "2".to_string());
        assert!(cache.get(&key("a")).is_some());

        cache.set(key("c"), "3".to_string());

        assert!(cache.get(&key("b")).is_none());
        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("c")).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replacing_a_key_never_evicts() {
        let (cache, _, _) = cache(2);
        cache.set(key("a"), "1".to_string());
        cache.set(key("b"), "2".to_string());
        cache.set(key("a"), "3".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get(&key("a")).map(|l| l.value), Some("3".to_string()));
    }

    #[test]
    fn test_stale_reads_and_purge() {
        let (cache, clock, _) = cache(10);
        cache.set(key("a"), "v".to_string());
        clock.advance(Duration::from_millis(150));

        assert!(cache.get(&key("a")).is_none());
        let stale = cache.get_stale(&key("a")).unwrap();
        assert!(stale.expired);
        assert_eq!(stale.value, "v");

        assert_eq!(cache.purge_expired(), 0);
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get_stale(&key("a")).is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (cache, _, _) = cache(10);
        cache.set(key("a"), "1".to_string());
        cache.set(key("b"), "2".to_string());

        assert!(cache.invalidate(&key("a")));
        assert!(!cache.invalidate(&key("a")));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_soft_expired_read_schedules_single_refresh() {
        let (cache, clock, _) = cache(10);
        cache.set(key("a"), "old".to_string());
        clock.advance(Duration::from_millis(85));

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let calls = calls.clone();
            let lookup = cache
                .get_with_refresh(&key("a"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("new".to_string())
                })
                .unwrap();
            assert!(lookup.soft_expired);
        }

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().refreshes_scheduled, 1);

        let refreshed = cache.get(&key("a")).unwrap();
        assert_eq!(refreshed.value, "new");
        assert!(!refreshed.soft_expired);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_entry() {
        let (cache, clock, sink) = cache(10);
        cache.set(key("a"), "old".to_string());
        clock.advance(Duration::from_millis(90));

        let lookup = cache.get_with_refresh(&key("a"), || async {
            Err(ClassifiedError::dependency_unavailable("down"))
        });
        assert!(lookup.is_some());

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert_eq!(cache.get(&key("a")).map(|l| l.value), Some("old".to_string()));
        assert_eq!(cache.stats().refresh_failures, 1);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, ResilienceEvent::RefreshFailed { .. })));
    }
}

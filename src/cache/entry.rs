//! Cache entry bookkeeping.

use crate::constants::MAX_CACHE_ENTRY_TTL;
use std::time::{Duration, Instant};

/// One cached value with absolute expiry timestamps computed at insertion
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    pub(crate) ttl: Duration,
    pub(crate) inserted_at: Instant,
    /// Hard expiry; the entry is never served by `get` at or after this instant
    pub(crate) expires_at: Instant,
    /// Start of the refresh-ahead window
    pub(crate) refresh_at: Instant,
    pub(crate) access_count: u64,
    pub(crate) last_accessed: Instant,
    /// Recency stamp, key into the LRU index
    pub(crate) tick: u64,
    pub(crate) refresh_scheduled: bool,
}

impl<V> CacheEntry<V> {
    /// `ttl` is clamped to [`MAX_CACHE_ENTRY_TTL`]
    pub(crate) fn new(value: V, ttl: Duration, refresh_threshold: f64, now: Instant, tick: u64) -> Self {
        let ttl = ttl.min(MAX_CACHE_ENTRY_TTL);
        let refresh_after = ttl.mul_f64((1.0 - refresh_threshold).clamp(0.0, 1.0));
        Self {
            value,
            ttl,
            inserted_at: now,
            expires_at: deadline(now, ttl),
            refresh_at: deadline(now, refresh_after),
            access_count: 0,
            last_accessed: now,
            tick,
            refresh_scheduled: false,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Past the refresh threshold but still before hard expiry
    pub(crate) fn is_soft_expired(&self, now: Instant) -> bool {
        now >= self.refresh_at && now < self.expires_at
    }

    /// Past hard expiry by at least `retention`
    pub(crate) fn is_past_retention(&self, now: Instant, retention: Duration) -> bool {
        self.expires_at
            .checked_add(retention)
            .is_some_and(|discard_at| now >= discard_at)
    }

    pub(crate) fn touch(&mut self, now: Instant, tick: u64) {
        self.access_count += 1;
        self.last_accessed = now;
        self.tick = tick;
    }

    pub(crate) fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }
}

/// `now + after`, saturating at the latest instant the platform can represent
fn deadline(now: Instant, after: Duration) -> Instant {
    if let Some(at) = now.checked_add(after) {
        return at;
    }
    let mut step = after;
    let mut at = now;
    while !step.is_zero() {
        match at.checked_add(step) {
            Some(next) => at = next,
            None => step /= 2,
        }
    }
    at
}

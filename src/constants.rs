//! # System Constants
//!
//! Defaults and operational bounds shared by the lookup pipeline components.

use std::time::Duration;

/// Canonical keys longer than this are replaced by their xxh3 digest
pub const MAX_RAW_KEY_LENGTH: usize = 256;

/// Pending dedup entries older than this are considered leaked
pub const DEFAULT_STALE_PENDING_THRESHOLD: Duration = Duration::from_secs(300);

/// Interval of the dedup stale-entry sweep
pub const DEFAULT_DEDUP_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Longest lifetime a cache entry can be given; longer TTLs are clamped to it
pub const MAX_CACHE_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Upper bound on how long hard-expired entries are kept for degraded reads
pub const MAX_STALE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Transition records retained per circuit breaker
pub const DEFAULT_TRANSITION_HISTORY_SIZE: usize = 50;

/// Component name of the breaker guarding the risk profile store
pub const PROFILE_STORE_COMPONENT: &str = "risk_profile_store";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "RISK_LOOKUP";

/// Data sources reported in lookup metadata
pub mod data_sources {
    pub const CACHE: &str = "cache";
    pub const BACKEND: &str = "backend";
    pub const FALLBACK: &str = "fallback";
}

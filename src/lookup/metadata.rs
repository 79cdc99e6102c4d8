//! Response metadata reported with every lookup.

use crate::cache::CacheStats;
use crate::constants::data_sources;
use crate::dedup::DedupStats;
use crate::resilience::{CircuitBreakerMetrics, CircuitState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the returned data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Cache,
    Backend,
    /// Stale cache or a canned fallback served in degraded mode
    Fallback,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Cache => data_sources::CACHE,
            DataSource::Backend => data_sources::BACKEND,
            DataSource::Fallback => data_sources::FALLBACK,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata the boundary layer uses to populate status and headers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupMetadata {
    pub cache_hit: bool,
    pub data_source: DataSource,
    /// Breaker state observed when the response was produced
    pub circuit_state: CircuitState,
    /// The data is a cached value past its hard expiry
    pub stale: bool,
    /// Code of the failure that forced degraded mode
    pub degraded_reason: Option<String>,
}

impl LookupMetadata {
    pub fn is_degraded(&self) -> bool {
        self.data_source == DataSource::Fallback
    }
}

/// Successful lookup outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse<V> {
    pub data: V,
    pub metadata: LookupMetadata,
}

/// Operational snapshot exposed to admin tooling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupStats {
    pub cache: CacheStats,
    pub circuit: CircuitBreakerMetrics,
    /// Fraction of this pipeline's breakers that are healthy
    pub circuit_health: f64,
    pub dedup: DedupStats,
    pub retries_pending: usize,
}

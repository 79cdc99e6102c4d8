//! # Lookup Configuration System
//!
//! Typed configuration for the resilient lookup pipeline. Values are layered by
//! [`ConfigManager`]: built-in defaults, then `config/lookup.toml`, then the
//! environment overlay `config/lookup.{environment}.toml`, then
//! `RISK_LOOKUP__SECTION__FIELD` environment variables.
//!
//! Durations are stored as integer milliseconds/seconds so the files stay
//! readable; use the `Duration` accessors on each section.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use risk_lookup_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let cache_ttl = manager.config().cache.default_ttl();
//! let breaker = manager.config().circuit_breaker.config_for_component("risk_profile_store");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{
    DEFAULT_DEDUP_CLEANUP_INTERVAL, DEFAULT_STALE_PENDING_THRESHOLD, MAX_CACHE_ENTRY_TTL,
    MAX_STALE_RETENTION,
};
use crate::resilience::CircuitBreakerConfig as RuntimeCircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LookupConfig {
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerSection,
    pub dedup: DedupConfig,
    pub degradation: DegradationConfig,
    pub maintenance: MaintenanceConfig,
}

impl LookupConfig {
    /// Configuration with short timings for fast test feedback
    pub fn for_test() -> Self {
        Self {
            cache: CacheConfig::for_test(),
            circuit_breaker: CircuitBreakerSection::for_test(),
            dedup: DedupConfig {
                stale_threshold_seconds: 5,
                cleanup_interval_seconds: 1,
            },
            degradation: DegradationConfig {
                retry_enabled: true,
                retry_delay_ms: 50,
            },
            maintenance: MaintenanceConfig {
                cache_purge_interval_seconds: 1,
                stats_interval_seconds: 1,
            },
        }
    }

    pub fn for_development() -> Self {
        Self {
            cache: CacheConfig {
                max_size: 500,
                default_ttl_ms: 60_000,
                ..CacheConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section, reporting the first problem found
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.circuit_breaker.validate()?;
        self.dedup.validate()?;
        self.degradation.validate()?;
        self.maintenance.validate()?;
        Ok(())
    }
}

/// Intelligent cache settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl_ms: u64,
    /// Fraction of the original TTL that, once remaining, triggers refresh-ahead
    pub refresh_threshold: f64,
    /// How long hard-expired entries stay available for degraded reads
    pub stale_retention_seconds: u64,
}

impl CacheConfig {
    pub fn for_test() -> Self {
        Self {
            max_size: 100,
            default_ttl_ms: 1_000,
            refresh_threshold: 0.2,
            stale_retention_seconds: 60,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn stale_retention(&self) -> Duration {
        Duration::from_secs(self.stale_retention_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_size",
                self.max_size,
                "must be greater than 0",
            ));
        }
        if self.default_ttl_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.default_ttl_ms",
                self.default_ttl_ms,
                "must be greater than 0",
            ));
        }
        if u128::from(self.default_ttl_ms) > MAX_CACHE_ENTRY_TTL.as_millis() {
            return Err(ConfigurationError::invalid_value(
                "cache.default_ttl_ms",
                self.default_ttl_ms,
                format!("must not exceed {}", MAX_CACHE_ENTRY_TTL.as_millis()),
            ));
        }
        if self.stale_retention_seconds > MAX_STALE_RETENTION.as_secs() {
            return Err(ConfigurationError::invalid_value(
                "cache.stale_retention_seconds",
                self.stale_retention_seconds,
                format!("must not exceed {}", MAX_STALE_RETENTION.as_secs()),
            ));
        }
        if !(self.refresh_threshold > 0.0 && self.refresh_threshold < 1.0) {
            return Err(ConfigurationError::invalid_value(
                "cache.refresh_threshold",
                self.refresh_threshold,
                "must be a fraction strictly between 0 and 1",
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1_000,
            default_ttl_ms: 300_000,
            refresh_threshold: 0.2,
            stale_retention_seconds: 3_600,
        }
    }
}

/// Circuit breaker settings for one protected component
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub monitoring_window_ms: u64,
    pub success_threshold: u32,
    pub half_open_max_calls: u32,
}

impl CircuitBreakerComponentConfig {
    /// Convert to the runtime configuration consumed by `CircuitBreaker`
    pub fn to_resilience_config(&self, history_size: usize) -> RuntimeCircuitBreakerConfig {
        RuntimeCircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            monitoring_window: Duration::from_millis(self.monitoring_window_ms),
            success_threshold: self.success_threshold,
            half_open_max_calls: self.half_open_max_calls,
            history_size,
        }
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 30_000,
            monitoring_window_ms: 60_000,
            success_threshold: 2,
            half_open_max_calls: 3,
        }
    }
}

/// Circuit breaker defaults plus per-component overrides
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSection {
    pub history_size: usize,
    pub max_circuit_breakers: usize,
    pub default_config: CircuitBreakerComponentConfig,
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

impl CircuitBreakerSection {
    pub fn for_test() -> Self {
        Self {
            default_config: CircuitBreakerComponentConfig {
                failure_threshold: 3,
                recovery_timeout_ms: 100,
                monitoring_window_ms: 1_000,
                success_threshold: 1,
                half_open_max_calls: 1,
            },
            ..Self::default()
        }
    }

    /// Runtime configuration for `component`, falling back to the default entry
    pub fn config_for_component(&self, component: &str) -> RuntimeCircuitBreakerConfig {
        self.component_configs
            .get(component)
            .unwrap_or(&self.default_config)
            .to_resilience_config(self.history_size)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.max_circuit_breakers",
                self.max_circuit_breakers,
                "must be greater than 0",
            ));
        }
        self.default_config
            .to_resilience_config(self.history_size)
            .validate()
            .map_err(|e| ConfigurationError::validation_error(format!("default_config: {e}")))?;
        for (name, component) in &self.component_configs {
            component
                .to_resilience_config(self.history_size)
                .validate()
                .map_err(|e| ConfigurationError::validation_error(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            history_size: crate::constants::DEFAULT_TRANSITION_HISTORY_SIZE,
            max_circuit_breakers: 50,
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs: HashMap::new(),
        }
    }
}

/// Request deduplication settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    pub stale_threshold_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl DedupConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.stale_threshold_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "dedup.stale_threshold_seconds",
                self.stale_threshold_seconds,
                "must be greater than 0",
            ));
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "dedup.cleanup_interval_seconds",
                self.cleanup_interval_seconds,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            stale_threshold_seconds: DEFAULT_STALE_PENDING_THRESHOLD.as_secs(),
            cleanup_interval_seconds: DEFAULT_DEDUP_CLEANUP_INTERVAL.as_secs(),
        }
    }
}

/// Graceful degradation settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DegradationConfig {
    pub retry_enabled: bool,
    /// Delay before a background retry when the error carries no retry-after hint
    pub retry_delay_ms: u64,
}

impl DegradationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry_enabled && self.retry_delay_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "degradation.retry_delay_ms",
                self.retry_delay_ms,
                "must be greater than 0 when retries are enabled",
            ));
        }
        Ok(())
    }
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            retry_enabled: true,
            retry_delay_ms: 5_000,
        }
    }
}

/// Background maintenance task intervals
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub cache_purge_interval_seconds: u64,
    pub stats_interval_seconds: u64,
}

impl MaintenanceConfig {
    pub fn cache_purge_interval(&self) -> Duration {
        Duration::from_secs(self.cache_purge_interval_seconds)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache_purge_interval_seconds == 0 || self.stats_interval_seconds == 0 {
            return Err(ConfigurationError::validation_error(
                "maintenance intervals must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cache_purge_interval_seconds: 60,
            stats_interval_seconds: 30,
        }
    }
}

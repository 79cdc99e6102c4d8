//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker instance.
//!
//! **Note**: For file/environment driven configuration use
//! `crate::config::CircuitBreakerSection`, which converts per-component
//! entries into this struct via `to_resilience_config()`.

use crate::constants::DEFAULT_TRANSITION_HISTORY_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures within the monitoring window before opening the circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before admitting a probe
    pub recovery_timeout: Duration,

    /// Failures older than this do not count toward the threshold
    pub monitoring_window: Duration,

    /// Successful probes in half-open state required to close the circuit
    pub success_threshold: u32,

    /// Probes admitted per half-open episode
    pub half_open_max_calls: u32,

    /// Transition records retained for observability
    pub history_size: usize,
}

impl CircuitBreakerConfig {
    /// Create configuration for database-backed lookups
    pub fn for_database() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            success_threshold: 2,
            half_open_max_calls: 3,
            history_size: DEFAULT_TRANSITION_HISTORY_SIZE,
        }
    }

    /// Create configuration for external API calls
    pub fn for_external_api() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(45),
            monitoring_window: Duration::from_secs(120),
            success_threshold: 2,
            half_open_max_calls: 2,
            history_size: DEFAULT_TRANSITION_HISTORY_SIZE,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.recovery_timeout.is_zero() {
            return Err("recovery_timeout must be greater than 0".to_string());
        }

        if self.recovery_timeout > Duration::from_secs(300) {
            return Err("recovery_timeout should not exceed 300 seconds".to_string());
        }

        if self.monitoring_window.is_zero() {
            return Err("monitoring_window must be greater than 0".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.half_open_max_calls < self.success_threshold {
            return Err(format!(
                "half_open_max_calls ({}) must be at least success_threshold ({})",
                self.half_open_max_calls, self.success_threshold
            ));
        }

        if self.history_size == 0 {
            return Err("history_size must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_database()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        let valid_config = CircuitBreakerConfig::default();
        assert!(valid_config.validate().is_ok());

        let mut invalid_config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            recovery_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            monitoring_window: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            success_threshold: 0,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_half_open_budget_must_cover_success_threshold() {
        let config = CircuitBreakerConfig {
            success_threshold: 3,
            half_open_max_calls: 2,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("half_open_max_calls"));
    }

    #[test]
    fn test_preset_configurations() {
        let db_config = CircuitBreakerConfig::for_database();
        assert_eq!(db_config.failure_threshold, 5);
        assert_eq!(db_config.recovery_timeout, Duration::from_secs(30));
        assert!(db_config.validate().is_ok());

        let api_config = CircuitBreakerConfig::for_external_api();
        assert_eq!(api_config.failure_threshold, 5);
        assert!(api_config.validate().is_ok());
    }
}

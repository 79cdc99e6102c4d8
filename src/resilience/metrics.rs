//! # Circuit Breaker Metrics
//!
//! Point-in-time snapshots of circuit breaker counters, plus a system-wide
//! aggregate used by the admin stats surface.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the protected operation
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls refused without invoking the operation
    pub rejected_calls: u64,

    /// Failures currently inside the monitoring window
    pub windowed_failures: u64,

    /// Probes admitted in the current half-open episode
    pub half_open_calls: u64,

    pub half_open_successes: u64,

    /// Total duration of all operations
    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,

    pub average_duration: Duration,

    /// Time since the most recent failure
    pub last_failure_age: Option<Duration>,

    /// Time until an open circuit admits a probe
    pub next_attempt_in: Option<Duration>,

    /// State transitions since creation
    pub transitions: u64,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_calls: 0,
            windowed_failures: 0,
            half_open_calls: 0,
            half_open_successes: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
            last_failure_age: None,
            next_attempt_in: None,
            transitions: 0,
        }
    }

    /// Open circuits and a closed circuit failing at 10% or more count as unhealthy.
    /// A half-open circuit is probing for recovery and counts as healthy.
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.failure_rate < 0.1,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of every breaker registered with a [`CircuitBreakerManager`]
///
/// [`CircuitBreakerManager`]: crate::resilience::CircuitBreakerManager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,
    pub collected_at: DateTime<Utc>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: Utc::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
    }

    /// Fraction of registered breakers that are healthy; 1.0 with none registered
    pub fn health_score(&self) -> f64 {
        let total = self.circuit_breakers.len();
        if total == 0 {
            return 1.0;
        }
        let healthy = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();
        healthy as f64 / total as f64
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

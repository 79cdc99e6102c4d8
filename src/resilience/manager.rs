//! # Circuit Breaker Manager
//!
//! Registry of circuit breakers keyed by component name. Breakers are created
//! on first use from the component's configured thresholds and share one clock
//! and one event sink.

use crate::clock::SharedClock;
use crate::config::CircuitBreakerSection;
use crate::events::SharedEventSink;
use crate::resilience::{CircuitBreaker, SystemCircuitBreakerMetrics};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Manager for multiple circuit breakers across system components
#[derive(Debug, Clone)]
pub struct CircuitBreakerManager {
    circuit_breakers: Arc<DashMap<String, Arc<CircuitBreaker>>>,
    config: CircuitBreakerSection,
    clock: SharedClock,
    sink: SharedEventSink,
}

impl CircuitBreakerManager {
    pub fn from_config(config: &CircuitBreakerSection, clock: SharedClock, sink: SharedEventSink) -> Self {
        info!(
            max_circuit_breakers = config.max_circuit_breakers,
            component_overrides = config.component_configs.len(),
            "Initializing circuit breaker manager"
        );

        Self {
            circuit_breakers: Arc::new(DashMap::new()),
            config: config.clone(),
            clock,
            sink,
        }
    }

    /// Get or create circuit breaker for a component
    pub fn get_circuit_breaker(&self, component_name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.circuit_breakers.get(component_name) {
            return Arc::clone(breaker.value());
        }

        let current_count = self.circuit_breakers.len();
        let entry = self
            .circuit_breakers
            .entry(component_name.to_string())
            .or_insert_with(|| {
                if current_count >= self.config.max_circuit_breakers {
                    warn!(
                        component = component_name,
                        current_count = current_count,
                        max_allowed = self.config.max_circuit_breakers,
                        "Maximum circuit breaker limit reached"
                    );
                }

                let component_config = self.config.config_for_component(component_name);
                info!(component = component_name, "Created new circuit breaker");
                Arc::new(CircuitBreaker::new(
                    component_name.to_string(),
                    component_config,
                    self.clock.clone(),
                    self.sink.clone(),
                ))
            });

        Arc::clone(entry.value())
    }

    pub fn list_components(&self) -> Vec<String> {
        self.circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Snapshot every registered breaker
    pub fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let mut system_metrics = SystemCircuitBreakerMetrics::new();
        for entry in self.circuit_breakers.iter() {
            system_metrics.add_circuit_breaker(entry.key().clone(), entry.value().metrics());
        }
        system_metrics
    }

    /// Reset every registered breaker to closed with zeroed counters
    pub fn reset_all(&self) {
        warn!(count = self.circuit_breakers.len(), "Resetting all circuit breakers");
        for entry in self.circuit_breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::events::MemoryEventSink;
    use crate::resilience::CircuitState;

    fn manager() -> CircuitBreakerManager {
        CircuitBreakerManager::from_config(
            &CircuitBreakerSection::default(),
            SystemClock::shared(),
            MemoryEventSink::new(16),
        )
    }

    #[test]
    fn test_get_or_create_circuit_breaker() {
        let manager = manager();

        let breaker1 = manager.get_circuit_breaker("risk_profile_store");
        let breaker2 = manager.get_circuit_breaker("risk_profile_store");
        assert!(Arc::ptr_eq(&breaker1, &breaker2));
        assert_eq!(manager.list_components(), vec!["risk_profile_store".to_string()]);
    }

    #[test]
    fn test_system_metrics_cover_every_breaker() {
        let manager = manager();
        manager.get_circuit_breaker("a");
        manager.get_circuit_breaker("b").force_open();

        let system = manager.system_metrics();
        assert_eq!(system.circuit_breakers.len(), 2);
        assert_eq!(system.circuit_breakers["b"].current_state, CircuitState::Open);
        assert_eq!(system.health_score(), 0.5);

        manager.reset_all();
        assert_eq!(manager.system_metrics().health_score(), 1.0);
    }
}

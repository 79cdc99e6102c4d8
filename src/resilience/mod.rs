//! # Resilience Module
//!
//! Circuit breaker protection for the backing store. A breaker fails fast
//! once failures inside its monitoring window reach the threshold, then
//! admits a bounded number of probes after the recovery timeout.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use risk_lookup_core::clock::SystemClock;
//! use risk_lookup_core::events::TracingEventSink;
//! use risk_lookup_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new(
//!     "risk_profile_store".to_string(),
//!     CircuitBreakerConfig::for_database(),
//!     SystemClock::shared(),
//!     TracingEventSink::shared(),
//! );
//!
//! let value = breaker.call(|| async { Ok::<_, std::io::Error>("profile") }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod history;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{counts_as_backend_failure, CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use history::{CounterSnapshot, TransitionReason, TransitionRecord};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};

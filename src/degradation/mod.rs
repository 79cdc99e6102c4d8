//! # Graceful Degradation
//!
//! Error classification at the backend boundary, fallback providers and the
//! coordinator that turns failures into stale or fallback responses.

pub mod classifier;
pub mod coordinator;
pub mod fallback;

pub use classifier::{classify, ErrorClassifier};
pub use coordinator::{
    Degraded, DegradedSource, DegradationCoordinator, Handled, RecoveryRecord, RecoveryStrategy,
};
pub use fallback::{FallbackProvider, NoFallback, StaticFallback};

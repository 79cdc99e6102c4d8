#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Risk Lookup Core
//!
//! Resilient data-access core for customer risk profile lookups. It sits
//! between a caller and the backing data store and makes lookups survive a
//! slow or failing backend.
//!
//! ## Pipeline
//!
//! Each lookup runs through four components, outermost first:
//!
//! 1. **Degradation** ([`degradation`]): classifies failures and serves stale
//!    cache or a fallback value instead of a hard error where possible
//! 2. **Deduplication** ([`dedup`]): concurrent identical requests share one
//!    in-flight execution
//! 3. **Cache** ([`cache`]): TTL + LRU with refresh-ahead
//! 4. **Circuit breaker** ([`resilience`]): fails fast while the backend is
//!    unhealthy and probes for recovery
//!
//! ## Module Organization
//!
//! - [`lookup`] - `ResilientLookup`, the public entry point, and the `BackingStore` trait
//! - [`request_key`] - Lookup parameters and deterministic request keys
//! - [`error`] - Error taxonomy shared by every component
//! - [`config`] - Layered configuration loading
//! - [`events`] - Fire-and-forget observability sink
//! - [`clock`] - Injectable time source
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use risk_lookup_core::config::ConfigManager;
//! use risk_lookup_core::lookup::{BackingStore, ResilientLookup};
//! use risk_lookup_core::{BackendError, LookupParams};
//!
//! #[derive(Debug)]
//! struct ProfileStore;
//!
//! #[async_trait::async_trait]
//! impl BackingStore<String> for ProfileStore {
//!     async fn fetch(&self, _params: &LookupParams) -> Result<String, BackendError> {
//!         Ok("low-risk".to_string())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! risk_lookup_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//!
//! let lookup = ResilientLookup::builder(ProfileStore)
//!     .config(manager.config().clone())
//!     .build()?;
//!
//! let response = lookup.lookup(LookupParams::new().with_order_id("1042")).await?;
//! println!("{} (cache hit: {})", response.data, response.metadata.cache_hit);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod degradation;
pub mod error;
pub mod events;
pub mod logging;
pub mod lookup;
pub mod request_key;
pub mod resilience;

pub use cache::{CacheStats, IntelligentCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigManager, ConfigurationError, LookupConfig};
pub use dedup::{DedupStats, Deduplicator};
pub use degradation::{DegradationCoordinator, FallbackProvider, NoFallback, StaticFallback};
pub use error::{BackendError, ClassifiedError, ErrorKind, LookupResult};
pub use events::{EventSink, ResilienceEvent, SharedEventSink};
pub use lookup::{
    BackingStore, DataSource, LookupMetadata, LookupResponse, LookupStats, MaintenanceHandle,
    ResilientLookup,
};
pub use request_key::{LookupParams, RequestKey};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

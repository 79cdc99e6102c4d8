//! # Lookup Service
//!
//! Public entry point of the crate: [`ResilientLookup`] wires request keys,
//! deduplication, caching, circuit breaking and degradation around a
//! [`BackingStore`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use risk_lookup_core::error::BackendError;
//! use risk_lookup_core::lookup::{BackingStore, ResilientLookup};
//! use risk_lookup_core::request_key::LookupParams;
//!
//! #[derive(Debug)]
//! struct ProfileStore;
//!
//! #[async_trait]
//! impl BackingStore<String> for ProfileStore {
//!     async fn fetch(&self, params: &LookupParams) -> Result<String, BackendError> {
//!         Ok(format!("profile for {:?}", params.phone))
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lookup = ResilientLookup::builder(ProfileStore).build()?;
//! let _maintenance = lookup.start_maintenance();
//!
//! let response = lookup
//!     .lookup(LookupParams::new().with_phone("+15550100"))
//!     .await?;
//! println!("{} via {}", response.data, response.metadata.data_source);
//! # Ok(())
//! # }
//! ```

pub mod maintenance;
pub mod metadata;
pub mod service;
pub mod store;

pub use maintenance::MaintenanceHandle;
pub use metadata::{DataSource, LookupMetadata, LookupResponse, LookupStats};
pub use service::{ResilientLookup, ResilientLookupBuilder};
pub use store::BackingStore;

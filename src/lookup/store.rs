//! Backing store collaborator.

use crate::constants::PROFILE_STORE_COMPONENT;
use crate::error::BackendError;
use crate::request_key::LookupParams;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// The opaque, idempotent lookup the pipeline protects (e.g. a database query).
///
/// Implementations carry their own timeout and report raw failures; the
/// pipeline classifies them.
#[async_trait]
pub trait BackingStore<V>: Send + Sync + Debug + 'static {
    async fn fetch(&self, params: &LookupParams) -> Result<V, BackendError>;

    /// Component name of the circuit breaker guarding this store
    fn name(&self) -> &str {
        PROFILE_STORE_COMPONENT
    }
}

#[async_trait]
impl<V, S> BackingStore<V> for Arc<S>
where
    V: Send + 'static,
    S: BackingStore<V> + ?Sized,
{
    async fn fetch(&self, params: &LookupParams) -> Result<V, BackendError> {
        (**self).fetch(params).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

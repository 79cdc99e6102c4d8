//! Canned values served when neither the backend nor the cache can answer.

use crate::request_key::RequestKey;
use std::fmt::Debug;

/// Source of a defined fallback value for a key
pub trait FallbackProvider<V>: Send + Sync + Debug {
    fn fallback(&self, key: &RequestKey) -> Option<V>;
}

/// The same value for every key
#[derive(Debug, Clone)]
pub struct StaticFallback<V> {
    value: V,
}

impl<V> StaticFallback<V> {
    pub fn new(value: V) -> Self {
        Self { value }
    }
}

impl<V> FallbackProvider<V> for StaticFallback<V>
where
    V: Clone + Send + Sync + Debug,
{
    fn fallback(&self, _key: &RequestKey) -> Option<V> {
        Some(self.value.clone())
    }
}

/// No fallback; degradation relies on stale cache only
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl<V> FallbackProvider<V> for NoFallback {
    fn fallback(&self, _key: &RequestKey) -> Option<V> {
        None
    }
}

//! # Degradation Coordinator
//!
//! Outermost stage of the lookup pipeline. Runs the primary operation and, on
//! failure, picks a recovery strategy from the error's kind:
//!
//! | kind                                | strategy                                     |
//! |-------------------------------------|----------------------------------------------|
//! | `CIRCUIT_OPEN`, `RATE_LIMITED`      | stale cache, else fallback                   |
//! | `DEPENDENCY_UNAVAILABLE`, `TIMEOUT` | stale cache, else fallback; background retry |
//! | `INTERNAL`                          | stale cache once, else propagate             |
//! | anything else                       | propagate                                    |
//!
//! Each applied strategy is reported to the event sink as a [`RecoveryRecord`].

use crate::cache::IntelligentCache;
use crate::config::DegradationConfig;
use crate::degradation::FallbackProvider;
use crate::error::{ClassifiedError, ErrorKind, LookupResult};
use crate::events::{ResilienceEvent, SharedEventSink};
use crate::request_key::RequestKey;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a failure of a given kind is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Return the error unchanged
    Propagate,
    /// Serve stale cache or the fallback value
    ServeDegraded,
    /// `ServeDegraded`, plus one background retry per key
    ServeDegradedWithRetry,
    /// Serve stale cache if present, otherwise propagate
    StaleOnly,
}

impl RecoveryStrategy {
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::CircuitOpen | ErrorKind::RateLimited => RecoveryStrategy::ServeDegraded,
            ErrorKind::DependencyUnavailable | ErrorKind::Timeout => {
                RecoveryStrategy::ServeDegradedWithRetry
            }
            ErrorKind::Internal => RecoveryStrategy::StaleOnly,
            ErrorKind::NotFound
            | ErrorKind::Validation
            | ErrorKind::Authentication
            | ErrorKind::Authorization => RecoveryStrategy::Propagate,
        }
    }
}

/// Where a degraded value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedSource {
    StaleCache,
    Fallback,
}

/// Observability record of one applied recovery strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub key: String,
    pub kind: ErrorKind,
    pub strategy: RecoveryStrategy,
    pub fallback_served: bool,
    pub data_source: Option<DegradedSource>,
    pub retry_scheduled: bool,
    pub at: DateTime<Utc>,
}

/// A value served in place of the primary result
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded<V> {
    pub value: V,
    pub source: DegradedSource,
    /// The cached value is past its hard expiry
    pub stale: bool,
    /// The failure that triggered degradation
    pub reason: ClassifiedError,
}

/// Result of [`DegradationCoordinator::handle`]
#[derive(Debug, Clone, PartialEq)]
pub enum Handled<P, V> {
    Primary(P),
    Degraded(Degraded<V>),
}

/// Chooses and applies recovery strategies. Cloning shares the retry registry.
pub struct DegradationCoordinator<V> {
    cache: IntelligentCache<V>,
    fallback: Arc<dyn FallbackProvider<V>>,
    config: DegradationConfig,
    sink: SharedEventSink,
    retries: Arc<DashMap<RequestKey, ()>>,
}

impl<V> Clone for DegradationCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            fallback: Arc::clone(&self.fallback),
            config: self.config.clone(),
            sink: Arc::clone(&self.sink),
            retries: Arc::clone(&self.retries),
        }
    }
}

impl<V> fmt::Debug for DegradationCoordinator<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DegradationCoordinator")
            .field("config", &self.config)
            .field("fallback", &self.fallback)
            .field("retries_pending", &self.retries.len())
            .finish()
    }
}

impl<V> DegradationCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        cache: IntelligentCache<V>,
        fallback: Arc<dyn FallbackProvider<V>>,
        config: DegradationConfig,
        sink: SharedEventSink,
    ) -> Self {
        Self {
            cache,
            fallback,
            config,
            sink,
            retries: Arc::new(DashMap::new()),
        }
    }

    /// Run `primary`; on failure apply the strategy for the error's kind.
    ///
    /// `primary` is cloned into the background retry task when one is scheduled.
    pub async fn handle<P, F, Fut>(&self, key: &RequestKey, primary: F) -> LookupResult<Handled<P, V>>
    where
        P: Send + 'static,
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = LookupResult<P>> + Send + 'static,
    {
        let error = match primary().await {
            Ok(value) => return Ok(Handled::Primary(value)),
            Err(error) => error,
        };

        let strategy = RecoveryStrategy::for_kind(error.kind());
        if strategy == RecoveryStrategy::Propagate {
            debug!(key = %key, kind = %error.kind(), "Propagating error without recovery");
            return Err(error);
        }

        let degraded = match strategy {
            RecoveryStrategy::StaleOnly => self.stale_value(key, &error),
            _ => self
                .stale_value(key, &error)
                .or_else(|| self.fallback_value(key, &error)),
        };

        let retry_scheduled = strategy == RecoveryStrategy::ServeDegradedWithRetry
            && self.schedule_retry(key, &error, primary);

        self.sink.record(ResilienceEvent::Recovery(RecoveryRecord {
            key: key.to_string(),
            kind: error.kind(),
            strategy,
            fallback_served: degraded.is_some(),
            data_source: degraded.as_ref().map(|d| d.source),
            retry_scheduled,
            at: Utc::now(),
        }));

        match degraded {
            Some(degraded) => {
                warn!(
                    key = %key,
                    kind = %error.kind(),
                    source = ?degraded.source,
                    stale = degraded.stale,
                    retry_scheduled = retry_scheduled,
                    "Serving degraded response"
                );
                Ok(Handled::Degraded(degraded))
            }
            None => {
                warn!(key = %key, kind = %error.kind(), "No degraded data available, propagating error");
                Err(error)
            }
        }
    }

    fn stale_value(&self, key: &RequestKey, error: &ClassifiedError) -> Option<Degraded<V>> {
        self.cache.get_stale(key).map(|stale| Degraded {
            value: stale.value,
            source: DegradedSource::StaleCache,
            stale: stale.expired,
            reason: error.clone(),
        })
    }

    fn fallback_value(&self, key: &RequestKey, error: &ClassifiedError) -> Option<Degraded<V>> {
        self.fallback.fallback(key).map(|value| Degraded {
            value,
            source: DegradedSource::Fallback,
            stale: false,
            reason: error.clone(),
        })
    }

    /// Spawn one delayed re-run of `primary` for `key`. Returns false if the
    /// error is not retryable, retries are disabled, or one is already pending.
    fn schedule_retry<P, F, Fut>(&self, key: &RequestKey, error: &ClassifiedError, primary: F) -> bool
    where
        P: Send + 'static,
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = LookupResult<P>> + Send + 'static,
    {
        if !self.config.retry_enabled || !error.is_retryable() {
            return false;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        match self.retries.entry(key.clone()) {
            Entry::Occupied(_) => {
                debug!(key = %key, "Background retry already scheduled");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let delay = error.retry_after().unwrap_or(self.config.retry_delay());
        let retries = Arc::clone(&self.retries);
        let key = key.clone();
        info!(key = %key, delay_ms = delay.as_millis() as u64, "Background retry scheduled");

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            match primary().await {
                Ok(_) => info!(key = %key, "Background retry succeeded"),
                Err(error) => warn!(key = %key, error = %error, "Background retry failed"),
            }
            retries.remove(&key);
        });
        true
    }

    /// Keys with a background retry waiting or running
    pub fn retries_pending(&self) -> usize {
        self.retries.len()
    }

    pub fn retry_delay(&self) -> Duration {
        self.config.retry_delay()
    }
}

//! # Resilient Lookup Pipeline
//!
//! Composes the four components into one request path:
//!
//! ```text
//! DegradationCoordinator -> Deduplicator -> cache hit? -> CircuitBreaker -> BackingStore -> populate cache
//! ```
//!
//! Every instance owns its own cache, dedup registry and breakers; nothing is
//! process-global, so tests construct isolated pipelines.

use crate::cache::IntelligentCache;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigResult, LookupConfig};
use crate::dedup::Deduplicator;
use crate::degradation::{
    DegradationCoordinator, DegradedSource, ErrorClassifier, FallbackProvider, Handled, NoFallback,
};
use crate::error::LookupResult;
use crate::events::{SharedEventSink, TracingEventSink};
use crate::lookup::metadata::{DataSource, LookupMetadata, LookupResponse, LookupStats};
use crate::lookup::{BackingStore, MaintenanceHandle};
use crate::request_key::{LookupParams, RequestKey};
use crate::resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Result of the non-degraded path, shared by every coalesced caller
#[derive(Debug, Clone)]
struct Fetched<V> {
    value: V,
    source: DataSource,
}

struct Pipeline<V, S> {
    store: S,
    cache: IntelligentCache<V>,
    dedup: Deduplicator<Fetched<V>>,
    breaker: Arc<CircuitBreaker>,
    breakers: CircuitBreakerManager,
    coordinator: DegradationCoordinator<V>,
    classifier: ErrorClassifier,
    config: LookupConfig,
}

impl<V, S> Pipeline<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: BackingStore<V>,
{
    /// Deduplicated cache-then-backend path
    async fn primary(self: Arc<Self>, key: RequestKey, params: Arc<LookupParams>) -> LookupResult<Fetched<V>> {
        let pipeline = Arc::clone(&self);
        let dedup_key = key.clone();
        self.dedup
            .execute(dedup_key, move || pipeline.fetch_through(key, params))
            .await
    }

    async fn fetch_through(self: Arc<Self>, key: RequestKey, params: Arc<LookupParams>) -> LookupResult<Fetched<V>> {
        let refresher = {
            let pipeline = Arc::clone(&self);
            let params = Arc::clone(&params);
            move || pipeline.load_from_store(params)
        };

        if let Some(hit) = self.cache.get_with_refresh(&key, refresher) {
            return Ok(Fetched {
                value: hit.value,
                source: DataSource::Cache,
            });
        }

        let value = Arc::clone(&self).load_from_store(params).await?;
        self.cache.set(key, value.clone());
        Ok(Fetched {
            value,
            source: DataSource::Backend,
        })
    }

    /// One breaker-protected backend call with classified errors
    async fn load_from_store(self: Arc<Self>, params: Arc<LookupParams>) -> LookupResult<V> {
        let pipeline = Arc::clone(&self);
        self.breaker
            .execute(move || async move {
                pipeline
                    .store
                    .fetch(&params)
                    .await
                    .map_err(|error| pipeline.classifier.classify(&error))
            })
            .await
    }
}

/// The resilient data-access core for one backing store
pub struct ResilientLookup<V, S> {
    inner: Arc<Pipeline<V, S>>,
}

impl<V, S> Clone for ResilientLookup<V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, S: fmt::Debug> fmt::Debug for ResilientLookup<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientLookup")
            .field("store", &self.inner.store)
            .field("breaker", &self.inner.breaker)
            .finish_non_exhaustive()
    }
}

impl<V, S> ResilientLookup<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: BackingStore<V>,
{
    /// Build a pipeline from validated configuration
    pub fn new(
        config: LookupConfig,
        store: S,
        clock: SharedClock,
        sink: SharedEventSink,
        fallback: Arc<dyn FallbackProvider<V>>,
    ) -> ConfigResult<Self> {
        Self::assemble(config, store, clock, sink, fallback, ErrorClassifier::default())
    }

    pub fn builder(store: S) -> ResilientLookupBuilder<V, S> {
        ResilientLookupBuilder::new(store)
    }

    fn assemble(
        config: LookupConfig,
        store: S,
        clock: SharedClock,
        sink: SharedEventSink,
        fallback: Arc<dyn FallbackProvider<V>>,
        classifier: ErrorClassifier,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let cache = IntelligentCache::new(config.cache.clone(), Arc::clone(&clock), Arc::clone(&sink));
        let dedup = Deduplicator::new(config.dedup.clone(), Arc::clone(&clock), Arc::clone(&sink));
        let breakers =
            CircuitBreakerManager::from_config(&config.circuit_breaker, Arc::clone(&clock), Arc::clone(&sink));
        let breaker = breakers.get_circuit_breaker(store.name());
        let coordinator = DegradationCoordinator::new(
            cache.clone(),
            fallback,
            config.degradation.clone(),
            Arc::clone(&sink),
        );

        info!(
            store = store.name(),
            cache_max_size = config.cache.max_size,
            cache_ttl_ms = config.cache.default_ttl_ms,
            failure_threshold = breaker.config().failure_threshold,
            "Resilient lookup pipeline initialized"
        );

        Ok(Self {
            inner: Arc::new(Pipeline {
                store,
                cache,
                dedup,
                breaker,
                breakers,
                coordinator,
                classifier,
                config,
            }),
        })
    }

    /// Look up the profile identified by `params`.
    ///
    /// Degraded responses (stale cache or fallback) are successes with
    /// `data_source = Fallback`; only the absence of any usable data is an error.
    #[instrument(skip(self, params))]
    pub async fn lookup(&self, params: LookupParams) -> LookupResult<LookupResponse<V>> {
        let key = RequestKey::from_params(&params)?;
        let params = Arc::new(params);

        let primary = {
            let pipeline = Arc::clone(&self.inner);
            let key = key.clone();
            move || Arc::clone(&pipeline).primary(key.clone(), Arc::clone(&params))
        };

        let handled = self.inner.coordinator.handle(&key, primary).await?;
        let circuit_state = self.inner.breaker.state();

        let response = match handled {
            Handled::Primary(fetched) => LookupResponse {
                metadata: LookupMetadata {
                    cache_hit: fetched.source == DataSource::Cache,
                    data_source: fetched.source,
                    circuit_state,
                    stale: false,
                    degraded_reason: None,
                },
                data: fetched.value,
            },
            Handled::Degraded(degraded) => LookupResponse {
                metadata: LookupMetadata {
                    cache_hit: false,
                    data_source: DataSource::Fallback,
                    circuit_state,
                    stale: degraded.source == DegradedSource::StaleCache && degraded.stale,
                    degraded_reason: Some(degraded.reason.code().to_string()),
                },
                data: degraded.value,
            },
        };

        debug!(
            key = %key,
            data_source = %response.metadata.data_source,
            cache_hit = response.metadata.cache_hit,
            circuit_state = %circuit_state,
            "Lookup completed"
        );
        Ok(response)
    }

    /// Close every circuit of this pipeline and zero its counters
    pub fn reset_circuit(&self) {
        self.inner.breakers.reset_all();
    }

    pub fn force_open_circuit(&self) {
        self.inner.breaker.force_open();
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drop the cached entry for `params`; returns whether one existed
    pub fn invalidate(&self, params: &LookupParams) -> LookupResult<bool> {
        let key = RequestKey::from_params(params)?;
        Ok(self.inner.cache.invalidate(&key))
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }

    pub fn stats(&self) -> LookupStats {
        LookupStats {
            cache: self.inner.cache.stats(),
            circuit: self.inner.breaker.metrics(),
            circuit_health: self.inner.breakers.system_metrics().health_score(),
            dedup: self.inner.dedup.stats(),
            retries_pending: self.inner.coordinator.retries_pending(),
        }
    }

    pub fn cache(&self) -> &IntelligentCache<V> {
        &self.inner.cache
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerManager {
        &self.inner.breakers
    }

    pub fn config(&self) -> &LookupConfig {
        &self.inner.config
    }

    /// Spawn the dedup stale sweep, expired-entry purge and periodic stats
    /// emission. Requires a tokio runtime; without one nothing is started.
    pub fn start_maintenance(&self) -> MaintenanceHandle {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No async runtime available, maintenance tasks not started");
            return MaintenanceHandle::default();
        }

        let maintenance = &self.inner.config.maintenance;
        let sweeper = self.inner.dedup.spawn_sweeper(self.inner.config.dedup.cleanup_interval());

        let cache = self.inner.cache.clone();
        let purge_interval = maintenance.cache_purge_interval();
        let purger = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(purge_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        });

        let cache = self.inner.cache.clone();
        let stats_interval = maintenance.stats_interval();
        let reporter = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(stats_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.emit_stats();
            }
        });

        info!(
            purge_interval_secs = purge_interval.as_secs(),
            stats_interval_secs = stats_interval.as_secs(),
            "Maintenance tasks started"
        );
        MaintenanceHandle::new(vec![sweeper, purger, reporter])
    }
}

/// Step-by-step construction with production defaults
pub struct ResilientLookupBuilder<V, S> {
    store: S,
    config: LookupConfig,
    clock: Option<SharedClock>,
    sink: Option<SharedEventSink>,
    fallback: Option<Arc<dyn FallbackProvider<V>>>,
    classifier: ErrorClassifier,
}

impl<V, S> ResilientLookupBuilder<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: BackingStore<V>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: LookupConfig::default(),
            clock: None,
            sink: None,
            fallback: None,
            classifier: ErrorClassifier::default(),
        }
    }

    pub fn config(mut self, config: LookupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn FallbackProvider<V>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> ConfigResult<ResilientLookup<V, S>> {
        ResilientLookup::assemble(
            self.config,
            self.store,
            self.clock.unwrap_or_else(SystemClock::shared),
            self.sink.unwrap_or_else(TracingEventSink::shared),
            self.fallback.unwrap_or_else(|| Arc::new(NoFallback)),
            self.classifier,
        )
    }
}

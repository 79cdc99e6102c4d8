//! Degraded responses when the profile store is failing

mod common;

use common::*;
use risk_lookup_core::config::LookupConfig;
use risk_lookup_core::degradation::{DegradedSource, NoFallback, RecoveryStrategy, StaticFallback};
use risk_lookup_core::{CircuitState, DataSource, ErrorKind, LookupParams};
use std::sync::Arc;
use std::time::Duration;

fn config_without_retry() -> LookupConfig {
    let mut config = LookupConfig::for_test();
    config.degradation.retry_enabled = false;
    config
}

#[tokio::test]
async fn test_expired_entry_is_served_when_store_is_down() {
    let pipeline = test_pipeline(MockProfileStore::healthy());
    let fresh = pipeline.lookup.lookup(phone("+15550100")).await.unwrap();
    assert_eq!(fresh.metadata.data_source, DataSource::Backend);

    pipeline.clock.advance(Duration::from_millis(1_001));
    pipeline.store.set_mode(StoreMode::Unavailable);

    let degraded = pipeline.lookup.lookup(phone("+15550100")).await.unwrap();
    assert_eq!(degraded.data, fresh.data);
    assert_eq!(degraded.metadata.data_source, DataSource::Fallback);
    assert!(!degraded.metadata.cache_hit);
    assert!(degraded.metadata.stale);
    assert_eq!(
        degraded.metadata.degraded_reason.as_deref(),
        Some("DEPENDENCY_UNAVAILABLE")
    );
    assert!(degraded.metadata.is_degraded());

    let recoveries = pipeline.sink.recoveries();
    assert_eq!(recoveries.len(), 1);
    assert_eq!(recoveries[0].kind, ErrorKind::DependencyUnavailable);
    assert_eq!(recoveries[0].strategy, RecoveryStrategy::ServeDegradedWithRetry);
    assert_eq!(recoveries[0].data_source, Some(DegradedSource::StaleCache));
    assert!(recoveries[0].fallback_served);
    assert!(recoveries[0].retry_scheduled);
}

#[tokio::test]
async fn test_open_circuit_serves_fallback_without_calling_store() {
    let store = MockProfileStore::with_mode(StoreMode::Unavailable);
    let pipeline = test_pipeline_with(
        store,
        config_without_retry(),
        Arc::new(StaticFallback::new(RiskProfile::fallback())),
    );

    for _ in 0..3 {
        let response = pipeline.lookup.lookup(phone("+15550111")).await.unwrap();
        assert_eq!(response.data, RiskProfile::fallback());
        assert!(!response.metadata.stale);
    }
    assert_eq!(pipeline.lookup.circuit_state(), CircuitState::Open);
    assert_eq!(pipeline.store.calls(), 3);

    let response = pipeline.lookup.lookup(phone("+15550111")).await.unwrap();
    assert_eq!(response.data, RiskProfile::fallback());
    assert_eq!(response.metadata.data_source, DataSource::Fallback);
    assert_eq!(response.metadata.circuit_state, CircuitState::Open);
    assert_eq!(response.metadata.degraded_reason.as_deref(), Some("CIRCUIT_OPEN"));
    assert_eq!(pipeline.store.calls(), 3);

    let last = pipeline.sink.recoveries().pop().unwrap();
    assert_eq!(last.kind, ErrorKind::CircuitOpen);
    assert_eq!(last.data_source, Some(DegradedSource::Fallback));
    assert!(!last.retry_scheduled);
}

#[tokio::test]
async fn test_circuit_recovers_after_timeout() {
    let store = MockProfileStore::with_mode(StoreMode::Timeout);
    let pipeline = test_pipeline_with(
        store,
        config_without_retry(),
        Arc::new(StaticFallback::new(RiskProfile::fallback())),
    );
    for _ in 0..3 {
        pipeline.lookup.lookup(phone("+15550122")).await.unwrap();
    }
    assert_eq!(pipeline.lookup.circuit_state(), CircuitState::Open);

    pipeline.store.set_mode(StoreMode::Healthy);
    pipeline.clock.advance(Duration::from_millis(100));

    let response = pipeline.lookup.lookup(phone("+15550122")).await.unwrap();
    assert_eq!(response.metadata.data_source, DataSource::Backend);
    assert_eq!(response.metadata.circuit_state, CircuitState::Closed);
    assert_eq!(response.data.customer, "+15550122");
}

#[tokio::test]
async fn test_nothing_to_serve_propagates_the_failure() {
    let pipeline = test_pipeline_with(
        MockProfileStore::with_mode(StoreMode::Unavailable),
        config_without_retry(),
        Arc::new(NoFallback),
    );

    let err = pipeline.lookup.lookup(phone("+15550133")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    assert!(err.is_retryable());

    let recoveries = pipeline.sink.recoveries();
    assert_eq!(recoveries.len(), 1);
    assert!(!recoveries[0].fallback_served);
    assert_eq!(recoveries[0].data_source, None);
}

#[tokio::test]
async fn test_not_found_is_never_degraded() {
    let pipeline = test_pipeline_with(
        MockProfileStore::with_mode(StoreMode::NotFound),
        LookupConfig::for_test(),
        Arc::new(StaticFallback::new(RiskProfile::fallback())),
    );

    for _ in 0..5 {
        let err = pipeline.lookup.lookup(phone("+15550144")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.http_status(), 404);
    }
    assert_eq!(pipeline.lookup.circuit_state(), CircuitState::Closed);
    assert!(pipeline.sink.recoveries().is_empty());
}

#[tokio::test]
async fn test_validation_failure_never_reaches_store() {
    let pipeline = test_pipeline(MockProfileStore::healthy());

    let err = pipeline
        .lookup
        .lookup(LookupParams::new().with_phone("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(pipeline.store.calls(), 0);
}

#[tokio::test]
async fn test_rate_limited_store_serves_fallback_without_retry() {
    let pipeline = test_pipeline_with(
        MockProfileStore::with_mode(StoreMode::RateLimited),
        LookupConfig::for_test(),
        Arc::new(StaticFallback::new(RiskProfile::fallback())),
    );

    let response = pipeline.lookup.lookup(phone("+15550155")).await.unwrap();
    assert_eq!(response.data, RiskProfile::fallback());
    assert_eq!(response.metadata.degraded_reason.as_deref(), Some("RATE_LIMITED"));
    assert_eq!(pipeline.lookup.stats().retries_pending, 0);

    let recovery = pipeline.sink.recoveries().pop().unwrap();
    assert_eq!(recovery.strategy, RecoveryStrategy::ServeDegraded);
    assert!(!recovery.retry_scheduled);
}

#[tokio::test]
async fn test_background_retry_repopulates_cache() {
    let pipeline = test_pipeline_with(
        MockProfileStore::with_mode(StoreMode::Unavailable),
        LookupConfig::for_test(),
        Arc::new(StaticFallback::new(RiskProfile::fallback())),
    );

    let degraded = pipeline.lookup.lookup(phone("+15550166")).await.unwrap();
    assert_eq!(degraded.data, RiskProfile::fallback());
    assert_eq!(pipeline.lookup.stats().retries_pending, 1);

    pipeline.store.set_mode(StoreMode::Healthy);
    while pipeline.lookup.stats().retries_pending > 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = pipeline.lookup.lookup(phone("+15550166")).await.unwrap();
    assert!(response.metadata.cache_hit);
    assert_eq!(response.metadata.data_source, DataSource::Cache);
    assert_eq!(response.data.customer, "+15550166");
    assert_eq!(pipeline.store.calls(), 2);
}

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use risk_lookup_core::clock::SystemClock;
use risk_lookup_core::config::{CacheConfig, LookupConfig};
use risk_lookup_core::events::MemoryEventSink;
use risk_lookup_core::{
    BackendError, BackingStore, IntelligentCache, LookupParams, RequestKey, ResilientLookup,
};

#[derive(Debug)]
struct StaticStore;

#[async_trait]
impl BackingStore<u32> for StaticStore {
    async fn fetch(&self, _params: &LookupParams) -> Result<u32, BackendError> {
        Ok(42)
    }
}

fn sample_params() -> LookupParams {
    LookupParams::new()
        .with_phone("+15550100")
        .with_order_name("#1001")
        .with_checkout_token("c1d2e3f4")
}

fn benchmark_request_key(c: &mut Criterion) {
    let params = sample_params();
    c.bench_function("request_key_from_params", |b| {
        b.iter(|| RequestKey::from_params(black_box(&params)))
    });
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let cache = IntelligentCache::new(
        CacheConfig::default(),
        SystemClock::shared(),
        MemoryEventSink::new(16),
    );
    let key = RequestKey::from("phone=+15550100");
    cache.set(key.clone(), 7u32);

    c.bench_function("cache_get_hit", |b| b.iter(|| cache.get(black_box(&key))));
}

fn benchmark_cached_lookup(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let lookup = ResilientLookup::builder(StaticStore)
        .config(LookupConfig::default())
        .event_sink(MemoryEventSink::new(16))
        .build()
        .expect("default configuration is valid");

    runtime.block_on(async {
        lookup.lookup(sample_params()).await.expect("warm-up lookup");
    });

    c.bench_function("lookup_cache_hit", |b| {
        b.to_async(&runtime)
            .iter(|| async { lookup.lookup(black_box(sample_params())).await })
    });
}

criterion_group!(
    benches,
    benchmark_request_key,
    benchmark_cache_hit,
    benchmark_cached_lookup
);
criterion_main!(benches);

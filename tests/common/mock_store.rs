use async_trait::async_trait;
use parking_lot::Mutex;
use risk_lookup_core::clock::ManualClock;
use risk_lookup_core::config::LookupConfig;
use risk_lookup_core::degradation::{FallbackProvider, NoFallback};
use risk_lookup_core::events::MemoryEventSink;
use risk_lookup_core::{BackendError, BackingStore, LookupParams, ResilientLookup};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Value served by the mock store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskProfile {
    pub customer: String,
    pub score: u32,
    /// Store call number that produced this profile
    pub version: usize,
}

impl RiskProfile {
    pub fn fallback() -> Self {
        Self {
            customer: "unknown".to_string(),
            score: 50,
            version: 0,
        }
    }
}

/// How the mock store answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Healthy,
    Unavailable,
    Timeout,
    NotFound,
    RateLimited,
}

/// Backing store with a programmable failure mode and a call counter
#[derive(Debug)]
pub struct MockProfileStore {
    calls: AtomicUsize,
    mode: Mutex<StoreMode>,
    delay: Mutex<Option<Duration>>,
}

impl MockProfileStore {
    pub fn healthy() -> Arc<Self> {
        Self::with_mode(StoreMode::Healthy)
    }

    pub fn with_mode(mode: StoreMode) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            mode: Mutex::new(mode),
            delay: Mutex::new(None),
        })
    }

    pub fn set_mode(&self, mode: StoreMode) {
        *self.mode.lock() = mode;
    }

    /// Every fetch sleeps this long (tokio time) before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackingStore<RiskProfile> for MockProfileStore {
    async fn fetch(&self, params: &LookupParams) -> Result<RiskProfile, BackendError> {
        let version = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mode = *self.mode.lock();
        match mode {
            StoreMode::Healthy => {
                let customer = params
                    .phone
                    .clone()
                    .or_else(|| params.order_id.clone())
                    .or_else(|| params.checkout_token.clone())
                    .unwrap_or_default();
                Ok(RiskProfile {
                    score: customer.len() as u32 * 7 % 100,
                    customer,
                    version,
                })
            }
            StoreMode::Unavailable => Err(BackendError::Connection("connection refused".to_string())),
            StoreMode::Timeout => Err(BackendError::Timeout(Duration::from_secs(2))),
            StoreMode::NotFound => Err(BackendError::NotFound("risk profile".to_string())),
            StoreMode::RateLimited => Err(BackendError::RateLimited { retry_after: None }),
        }
    }
}

/// Pipeline over the mock store, driven by a manual clock and recording every event
pub struct TestPipeline {
    pub lookup: ResilientLookup<RiskProfile, Arc<MockProfileStore>>,
    pub store: Arc<MockProfileStore>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemoryEventSink>,
}

pub fn test_pipeline(store: Arc<MockProfileStore>) -> TestPipeline {
    test_pipeline_with(store, LookupConfig::for_test(), Arc::new(NoFallback))
}

pub fn test_pipeline_with(
    store: Arc<MockProfileStore>,
    config: LookupConfig,
    fallback: Arc<dyn FallbackProvider<RiskProfile>>,
) -> TestPipeline {
    let clock = ManualClock::new();
    let sink = MemoryEventSink::new(256);
    let lookup = ResilientLookup::builder(Arc::clone(&store))
        .config(config)
        .clock(clock.clone())
        .event_sink(sink.clone())
        .fallback(fallback)
        .build()
        .expect("test configuration is valid");

    TestPipeline {
        lookup,
        store,
        clock,
        sink,
    }
}

pub fn phone(number: &str) -> LookupParams {
    LookupParams::new().with_phone(number)
}

/// Let spawned tasks on the current-thread runtime make progress
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

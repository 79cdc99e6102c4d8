//! # Request Deduplication
//!
//! Concurrent callers asking for the same [`RequestKey`] share one in-flight
//! execution. The first caller registers a [`Shared`] future; later callers
//! attach to it and receive a clone of the identical outcome, value or error.
//!
//! The shared future removes its own registry entry in the same poll that
//! produces the result, under the registry lock. A caller therefore either
//! attaches before completion and observes the result, or finds no entry and
//! starts a fresh execution.
//!
//! Every attached caller polls the shared future, so a dropped first caller
//! does not strand the others. Entries whose execution never completes are
//! removed by [`Deduplicator::sweep_stale`].
//!
//! ```rust
//! use risk_lookup_core::clock::SystemClock;
//! use risk_lookup_core::config::DedupConfig;
//! use risk_lookup_core::events::TracingEventSink;
//! use risk_lookup_core::{Deduplicator, RequestKey};
//!
//! # tokio_test::block_on(async {
//! let dedup: Deduplicator<u32> =
//!     Deduplicator::new(DedupConfig::default(), SystemClock::shared(), TracingEventSink::shared());
//!
//! let key = RequestKey::from("phone=+15550100");
//! let (a, b) = tokio::join!(
//!     dedup.execute(key.clone(), || async {
//!         tokio::task::yield_now().await;
//!         Ok(7)
//!     }),
//!     dedup.execute(key.clone(), || async { Ok(8) }),
//! );
//! assert_eq!(a.unwrap(), 7);
//! assert_eq!(b.unwrap(), 7);
//! # });
//! ```

use crate::clock::SharedClock;
use crate::config::DedupConfig;
use crate::error::LookupResult;
use crate::events::{ResilienceEvent, SharedEventSink};
use crate::request_key::RequestKey;
use chrono::Utc;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type SharedExecution<T> = Shared<BoxFuture<'static, LookupResult<T>>>;

/// One in-flight execution for a key
struct PendingEntry<T> {
    execution: SharedExecution<T>,
    created_at: Instant,
    waiters: Arc<AtomicUsize>,
    generation: u64,
}

/// Deduplicator counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub executions_started: u64,
    /// Callers that attached to an existing execution
    pub coalesced: u64,
    pub pending: usize,
    pub stale_swept: u64,
}

struct DedupInner<T> {
    pending: Mutex<HashMap<RequestKey, PendingEntry<T>>>,
    config: DedupConfig,
    clock: SharedClock,
    sink: SharedEventSink,
    next_generation: AtomicU64,
    executions_started: AtomicU64,
    coalesced: AtomicU64,
    stale_swept: AtomicU64,
}

impl<T> DedupInner<T> {
    /// Remove the entry for `key` if it still belongs to `generation`
    fn complete(&self, key: &RequestKey, generation: u64) {
        let mut pending = self.pending.lock();
        if pending
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            pending.remove(key);
        }
    }
}

/// Registry of in-flight executions keyed by request. Cloning shares the registry.
pub struct Deduplicator<T> {
    inner: Arc<DedupInner<T>>,
}

impl<T> Clone for Deduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Deduplicator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deduplicator")
            .field("pending", &self.inner.pending.lock().len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: DedupConfig, clock: SharedClock, sink: SharedEventSink) -> Self {
        Self {
            inner: Arc::new(DedupInner {
                pending: Mutex::new(HashMap::new()),
                config,
                clock,
                sink,
                next_generation: AtomicU64::new(0),
                executions_started: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                stale_swept: AtomicU64::new(0),
            }),
        }
    }

    /// Run `op` for `key`, or attach to the execution already in flight.
    ///
    /// `op` is always called to build its future, before the registry lock is
    /// taken. The future is only polled when no execution is pending; a caller
    /// that attaches drops it unpolled.
    pub async fn execute<F, Fut>(&self, key: RequestKey, op: F) -> LookupResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LookupResult<T>> + Send + 'static,
    {
        let operation = op();
        let execution = {
            let mut pending = self.inner.pending.lock();
            match pending.get(&key) {
                Some(entry) => {
                    let waiters = entry.waiters.fetch_add(1, Ordering::AcqRel) + 1;
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, waiters = waiters, "Attached to in-flight execution");
                    entry.execution.clone()
                }
                None => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let registry: Weak<DedupInner<T>> = Arc::downgrade(&self.inner);
                    let completed_key = key.clone();

                    let execution = async move {
                        let result = operation.await;
                        if let Some(inner) = registry.upgrade() {
                            inner.complete(&completed_key, generation);
                        }
                        result
                    }
                    .boxed()
                    .shared();

                    pending.insert(
                        key.clone(),
                        PendingEntry {
                            execution: execution.clone(),
                            created_at: self.inner.clock.now(),
                            waiters: Arc::new(AtomicUsize::new(1)),
                            generation,
                        },
                    );
                    self.inner.executions_started.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Started new execution");
                    execution
                }
            }
        };

        execution.await
    }

    /// Number of in-flight executions
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Callers attached to the execution for `key`, if one is in flight
    pub fn waiter_count(&self, key: &RequestKey) -> Option<usize> {
        self.inner
            .pending
            .lock()
            .get(key)
            .map(|entry| entry.waiters.load(Ordering::Acquire))
    }

    /// Remove entries older than the stale threshold. Returns the number removed.
    pub fn sweep_stale(&self) -> usize {
        let now = self.inner.clock.now();
        let threshold = self.inner.config.stale_threshold();

        let removed = {
            let mut pending = self.inner.pending.lock();
            let before = pending.len();
            pending.retain(|key, entry| {
                let stale = now.saturating_duration_since(entry.created_at) >= threshold;
                if stale {
                    warn!(
                        key = %key,
                        waiters = entry.waiters.load(Ordering::Acquire),
                        "Removing stale pending execution"
                    );
                }
                !stale
            });
            before - pending.len()
        };

        if removed > 0 {
            self.inner
                .stale_swept
                .fetch_add(removed as u64, Ordering::Relaxed);
            self.inner.sink.record(ResilienceEvent::StaleSwept {
                removed,
                at: Utc::now(),
            });
        }
        removed
    }

    /// Run `sweep_stale` every `interval` until the deduplicator is dropped
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = registry.upgrade() else {
                    debug!("Deduplicator dropped, stopping stale sweeper");
                    break;
                };
                Deduplicator { inner }.sweep_stale();
            }
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            executions_started: self.inner.executions_started.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            pending: self.pending_count(),
            stale_swept: self.inner.stale_swept.load(Ordering::Relaxed),
        }
    }
}

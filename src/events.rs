//! # Resilience Events
//!
//! Fire-and-forget sink for state-transition records, cache statistics and
//! degradation decisions. Sinks must never block or fail the request path:
//! [`ChannelEventSink`] drops events when its buffer is full rather than
//! waiting, and [`MemoryEventSink`] evicts its oldest event.

use crate::cache::CacheStats;
use crate::degradation::RecoveryRecord;
use crate::resilience::TransitionRecord;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Observability record emitted by the pipeline components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResilienceEvent {
    CircuitTransition {
        component: String,
        record: TransitionRecord,
    },
    Recovery(RecoveryRecord),
    CacheStats {
        stats: CacheStats,
        at: DateTime<Utc>,
    },
    RefreshFailed {
        key: String,
        error: String,
        at: DateTime<Utc>,
    },
    StaleSwept {
        removed: usize,
        at: DateTime<Utc>,
    },
}

/// Receiver of resilience events
pub trait EventSink: Send + Sync + Debug {
    fn record(&self, event: ResilienceEvent);
}

/// Shared sink handle passed to every component
pub type SharedEventSink = Arc<dyn EventSink>;

/// Sink that writes each event as a structured tracing record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn shared() -> SharedEventSink {
        Arc::new(TracingEventSink)
    }
}

impl EventSink for TracingEventSink {
    fn record(&self, event: ResilienceEvent) {
        match event {
            ResilienceEvent::CircuitTransition { component, record } => {
                info!(
                    circuit_breaker = %component,
                    from_state = ?record.from,
                    to_state = ?record.to,
                    reason = ?record.reason,
                    windowed_failures = record.counters.windowed_failures,
                    "Circuit breaker state transition"
                );
            }
            ResilienceEvent::Recovery(record) => {
                warn!(
                    key = %record.key,
                    kind = %record.kind,
                    strategy = ?record.strategy,
                    fallback_served = record.fallback_served,
                    retry_scheduled = record.retry_scheduled,
                    "Degradation strategy applied"
                );
            }
            ResilienceEvent::CacheStats { stats, .. } => {
                debug!(
                    hits = stats.hits,
                    misses = stats.misses,
                    evictions = stats.evictions,
                    size = stats.size,
                    hit_rate = stats.hit_rate,
                    "Cache statistics"
                );
            }
            ResilienceEvent::RefreshFailed { key, error, .. } => {
                warn!(key = %key, error = %error, "Background cache refresh failed");
            }
            ResilienceEvent::StaleSwept { removed, .. } => {
                warn!(removed = removed, "Swept stale pending executions");
            }
        }
    }
}

/// Sink forwarding events into a bounded channel without ever waiting
#[derive(Debug)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<ResilienceEvent>,
    dropped: AtomicU64,
}

impl ChannelEventSink {
    /// Create the sink and the receiving end of its channel
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<ResilienceEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Arc::new(Self {
                sender,
                dropped: AtomicU64::new(0),
            }),
            receiver,
        )
    }

    /// Events discarded because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEventSink {
    fn record(&self, event: ResilienceEvent) {
        if self.sender.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Bounded in-memory sink, oldest events evicted first
#[derive(Debug)]
pub struct MemoryEventSink {
    events: Mutex<VecDeque<ResilienceEvent>>,
    capacity: usize,
}

impl MemoryEventSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        })
    }

    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn recoveries(&self) -> Vec<RecoveryRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ResilienceEvent::Recovery(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ResilienceEvent::CircuitTransition { record, .. } => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: ResilienceEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}

//! # Transition History
//!
//! Every circuit breaker state change produces a [`TransitionRecord`]. The
//! breaker keeps the most recent records in a bounded buffer and forwards each
//! one to its event sink.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Why a circuit breaker changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Windowed failure count reached `failure_threshold`
    FailureThreshold,
    /// `recovery_timeout` elapsed and a probe was admitted
    RecoveryTimeoutElapsed,
    /// A call failed while half-open
    HalfOpenFailure,
    /// Half-open probes reached `success_threshold`
    HalfOpenSuccessThreshold,
    ForcedOpen,
    ForcedClose,
    Reset,
}

/// Counter values captured at the moment of a transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub windowed_failures: u32,
    pub half_open_admitted: u32,
    pub half_open_successes: u32,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// One state change of a circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
    pub reason: TransitionReason,
    pub counters: CounterSnapshot,
}

/// Fixed-capacity buffer of the most recent transitions
#[derive(Debug, Clone)]
pub(crate) struct TransitionHistory {
    records: VecDeque<TransitionRecord>,
    capacity: usize,
}

impl TransitionHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, record: TransitionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub(crate) fn to_vec(&self) -> Vec<TransitionRecord> {
        self.records.iter().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for the backing store. This implementation follows
//! the classic circuit breaker pattern with three states: Closed (normal
//! operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! Failures are counted inside a rolling time window, so a slow trickle of
//! failures spread over hours never trips the circuit. Every read-modify-write
//! of the state machine happens under one mutex per breaker; call totals live in
//! lock-free atomics so snapshots never contend with the hot path.
//!
//! When the half-open probe budget is used up before `success_threshold`
//! successes arrive, the breaker stays half-open and rejects further calls with
//! `CIRCUIT_OPEN` until an admitted probe settles. A probe that is dropped
//! without an outcome gives its slot back.

use crate::clock::SharedClock;
use crate::error::{ClassifiedError, LookupResult};
use crate::events::{ResilienceEvent, SharedEventSink};
use crate::resilience::history::{CounterSnapshot, TransitionHistory, TransitionReason, TransitionRecord};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lock-free atomic counters for circuit breaker metrics.
#[derive(Debug)]
struct AtomicCircuitBreakerMetrics {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rejected_calls: AtomicU64,
    transitions: AtomicU64,
    total_duration_nanos: AtomicU64,
}

impl AtomicCircuitBreakerMetrics {
    fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
            transitions: AtomicU64::new(0),
            total_duration_nanos: AtomicU64::new(0),
        }
    }

    #[inline]
    fn record_success(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_failure(&self, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_rejection(&self) {
        self.rejected_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.rejected_calls.store(0, Ordering::Relaxed);
        self.total_duration_nanos.store(0, Ordering::Relaxed);
    }
}

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen {
        component: String,
        retry_after: Duration,
    },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl From<CircuitBreakerError<ClassifiedError>> for ClassifiedError {
    fn from(error: CircuitBreakerError<ClassifiedError>) -> Self {
        match error {
            CircuitBreakerError::CircuitOpen {
                component,
                retry_after,
            } => ClassifiedError::circuit_open(&component, retry_after),
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

/// State machine guarded by the breaker's mutex
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    last_failure: Option<Instant>,
    next_attempt: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
    /// Incremented on every entry into half-open; probes carry the value
    /// they were admitted under
    episode: u64,
    history: TransitionHistory,
}

/// Admission ticket for one call; returns its half-open slot if dropped unsettled
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    episode: Option<u64>,
    settled: bool,
}

impl CallPermit<'_> {
    fn settle(mut self) -> Option<u64> {
        self.settled = true;
        self.episode
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            if let Some(episode) = self.episode {
                self.breaker.release_probe(episode);
            }
        }
    }
}

/// Core circuit breaker implementation
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Mirror of `inner.state` for lock-free reads
    state: AtomicU8,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    clock: SharedClock,

    sink: SharedEventSink,

    /// Lock-free atomic metrics
    metrics: AtomicCircuitBreakerMetrics,

    inner: Mutex<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(
        name: String,
        config: CircuitBreakerConfig,
        clock: SharedClock,
        sink: SharedEventSink,
    ) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis() as u64,
            monitoring_window_ms = config.monitoring_window.as_millis() as u64,
            success_threshold = config.success_threshold,
            half_open_max_calls = config.half_open_max_calls,
            "Circuit breaker initialized"
        );

        let history = TransitionHistory::new(config.history_size);
        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            clock,
            sink,
            metrics: AtomicCircuitBreakerMetrics::new(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                last_failure: None,
                next_attempt: None,
                half_open_admitted: 0,
                half_open_successes: 0,
                episode: 0,
                history,
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute a lookup operation with circuit breaker protection.
    ///
    /// Outcomes that are legitimate answers rather than backend trouble
    /// (`NOT_FOUND`, `VALIDATION`, auth failures) do not count as failures.
    /// An open circuit yields a `CIRCUIT_OPEN` error without invoking
    /// `operation`; otherwise the operation's own error is returned.
    pub async fn execute<F, T, Fut>(&self, operation: F) -> LookupResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LookupResult<T>>,
    {
        self.call_with_classifier(operation, |err: &ClassifiedError| {
            counts_as_backend_failure(err)
        })
        .await
        .map_err(ClassifiedError::from)
    }

    /// Execute an operation with circuit breaker protection; every error
    /// counts as a failure
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with_classifier(operation, |_| true).await
    }

    async fn call_with_classifier<F, T, E, Fut, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let permit = self.acquire()?;

        let start_time = self.clock.now();
        let result = operation().await;
        let duration = self.clock.now().saturating_duration_since(start_time);

        let episode = permit.settle();
        match &result {
            Err(err) if is_failure(err) => self.record_failure(episode, duration),
            _ => self.record_success(episode, duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed, transitioning Open -> HalfOpen when
    /// the recovery timeout has elapsed
    fn acquire<E>(&self) -> Result<CallPermit<'_>, CircuitBreakerError<E>> {
        let now = self.clock.now();
        let mut transition = None;

        let admitted = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => Ok(None),
                CircuitState::Open => {
                    let next_attempt = inner.next_attempt.unwrap_or(now);
                    if now >= next_attempt {
                        transition = Some(self.transition(
                            &mut inner,
                            CircuitState::HalfOpen,
                            TransitionReason::RecoveryTimeoutElapsed,
                        ));
                        inner.half_open_admitted = 1;
                        Ok(Some(inner.episode))
                    } else {
                        Err(next_attempt.saturating_duration_since(now))
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_admitted < self.config.half_open_max_calls {
                        inner.half_open_admitted += 1;
                        Ok(Some(inner.episode))
                    } else {
                        Err(Duration::ZERO)
                    }
                }
            }
        };

        if let Some(record) = transition {
            self.emit(record);
        }

        match admitted {
            Ok(episode) => Ok(CallPermit {
                breaker: self,
                episode,
                settled: false,
            }),
            Err(retry_after) => {
                self.metrics.record_rejection();
                debug!(
                    component = %self.name,
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Call rejected by circuit breaker"
                );
                Err(CircuitBreakerError::CircuitOpen {
                    component: self.name.clone(),
                    retry_after,
                })
            }
        }
    }

    /// Give back a half-open slot whose call never reported an outcome
    fn release_probe(&self, episode: u64) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen
            && inner.episode == episode
            && inner.half_open_admitted > 0
        {
            inner.half_open_admitted -= 1;
            debug!(component = %self.name, "Half-open probe released without outcome");
        }
    }

    /// Record a successful operation
    fn record_success(&self, episode: Option<u64>, duration: Duration) {
        self.metrics.record_success(duration);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        let transition = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::HalfOpen if episode == Some(inner.episode) => {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.success_threshold {
                        Some(self.transition(
                            &mut inner,
                            CircuitState::Closed,
                            TransitionReason::HalfOpenSuccessThreshold,
                        ))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen | CircuitState::Closed => None,
                CircuitState::Open => {
                    // A call admitted before the circuit opened finished late
                    warn!(component = %self.name, "Success recorded while circuit is open");
                    None
                }
            }
        };

        if let Some(record) = transition {
            self.emit(record);
        }
    }

    /// Record a failed operation
    fn record_failure(&self, episode: Option<u64>, duration: Duration) {
        self.metrics.record_failure(duration);
        let now = self.clock.now();

        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation failed"
        );

        let transition = {
            let mut inner = self.inner.lock();
            inner.last_failure = Some(now);
            match inner.state {
                CircuitState::Closed => {
                    inner.failures.push_back(now);
                    self.prune_window(&mut inner, now);
                    if inner.failures.len() as u32 >= self.config.failure_threshold {
                        Some(self.transition(
                            &mut inner,
                            CircuitState::Open,
                            TransitionReason::FailureThreshold,
                        ))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    if episode != Some(inner.episode) {
                        debug!(component = %self.name, "Failure from a pre-probe call while half-open");
                    }
                    // Any failure in half-open state immediately opens circuit
                    Some(self.transition(
                        &mut inner,
                        CircuitState::Open,
                        TransitionReason::HalfOpenFailure,
                    ))
                }
                CircuitState::Open => None,
            }
        };

        if let Some(record) = transition {
            self.emit(record);
        }
    }

    fn prune_window(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some(oldest) = inner.failures.front() {
            if now.saturating_duration_since(*oldest) >= self.config.monitoring_window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Reset the per-state counters for `to` and publish it as the current state
    fn enter_state(&self, inner: &mut BreakerInner, to: CircuitState, now: Instant) {
        match to {
            CircuitState::Open => {
                inner.next_attempt = Some(now + self.config.recovery_timeout);
                inner.half_open_admitted = 0;
                inner.half_open_successes = 0;
            }
            CircuitState::HalfOpen => {
                inner.episode += 1;
                inner.half_open_admitted = 0;
                inner.half_open_successes = 0;
            }
            CircuitState::Closed => {
                inner.failures.clear();
                inner.next_attempt = None;
                inner.half_open_admitted = 0;
                inner.half_open_successes = 0;
            }
        }

        inner.state = to;
        self.state.store(to as u8, Ordering::Release);
    }

    /// Apply a state change under the lock and return its record.
    fn transition(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
        reason: TransitionReason,
    ) -> TransitionRecord {
        let now = self.clock.now();
        let from = inner.state;
        let counters = CounterSnapshot {
            windowed_failures: inner.failures.len() as u32,
            half_open_admitted: inner.half_open_admitted,
            half_open_successes: inner.half_open_successes,
            total_calls: self.metrics.total_calls.load(Ordering::Relaxed),
            total_failures: self.metrics.failure_count.load(Ordering::Relaxed),
        };

        self.enter_state(inner, to, now);
        self.metrics.transitions.fetch_add(1, Ordering::Relaxed);

        let record = TransitionRecord {
            from,
            to,
            at: Utc::now(),
            reason,
            counters,
        };
        inner.history.push(record.clone());
        record
    }

    /// Log a transition and hand it to the event sink (called without the lock held)
    fn emit(&self, record: TransitionRecord) {
        match record.to {
            CircuitState::Open => error!(
                component = %self.name,
                reason = ?record.reason,
                windowed_failures = record.counters.windowed_failures,
                failure_threshold = self.config.failure_threshold,
                recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                "Circuit breaker opened (failing fast)"
            ),
            CircuitState::HalfOpen => info!(
                component = %self.name,
                half_open_max_calls = self.config.half_open_max_calls,
                success_threshold = self.config.success_threshold,
                "Circuit breaker half-open (testing recovery)"
            ),
            CircuitState::Closed => info!(
                component = %self.name,
                reason = ?record.reason,
                total_calls = record.counters.total_calls,
                "Circuit breaker closed"
            ),
        }

        self.sink.record(ResilienceEvent::CircuitTransition {
            component: self.name.clone(),
            record,
        });
    }

    /// Operator override: move to `to`, recording a transition only when the
    /// state actually changes. Re-entering the current state resets its counters.
    fn override_state(
        &self,
        inner: &mut BreakerInner,
        to: CircuitState,
        reason: TransitionReason,
    ) -> Option<TransitionRecord> {
        if inner.state == to {
            let now = self.clock.now();
            self.enter_state(inner, to, now);
            return None;
        }
        Some(self.transition(inner, to, reason))
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let record = {
            let mut inner = self.inner.lock();
            self.override_state(&mut inner, CircuitState::Open, TransitionReason::ForcedOpen)
        };
        if let Some(record) = record {
            self.emit(record);
        }
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_close(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let record = {
            let mut inner = self.inner.lock();
            self.override_state(&mut inner, CircuitState::Closed, TransitionReason::ForcedClose)
        };
        if let Some(record) = record {
            self.emit(record);
        }
    }

    /// Close the circuit and zero every counter; transition history is kept
    pub fn reset(&self) {
        let record = {
            let mut inner = self.inner.lock();
            let record = self.override_state(&mut inner, CircuitState::Closed, TransitionReason::Reset);
            inner.last_failure = None;
            self.metrics.reset();
            record
        };
        info!(component = %self.name, "Circuit breaker reset");
        if let Some(record) = record {
            self.emit(record);
        }
    }

    /// Recent transitions, oldest first
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.inner.lock().history.to_vec()
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::Closed {
            self.prune_window(&mut inner, now);
        }

        let total_calls = self.metrics.total_calls.load(Ordering::Relaxed);
        let success_count = self.metrics.success_count.load(Ordering::Relaxed);
        let failure_count = self.metrics.failure_count.load(Ordering::Relaxed);
        let total_duration_nanos = self.metrics.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, success_rate, average_duration) = if total_calls > 0 {
            (
                failure_count as f64 / total_calls as f64,
                success_count as f64 / total_calls as f64,
                Duration::from_nanos(total_duration_nanos / total_calls),
            )
        } else {
            (0.0, 0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            rejected_calls: self.metrics.rejected_calls.load(Ordering::Relaxed),
            windowed_failures: inner.failures.len() as u64,
            half_open_calls: u64::from(inner.half_open_admitted),
            half_open_successes: u64::from(inner.half_open_successes),
            total_duration: Duration::from_nanos(total_duration_nanos),
            current_state: inner.state,
            failure_rate,
            success_rate,
            average_duration,
            last_failure_age: inner.last_failure.map(|at| now.saturating_duration_since(at)),
            next_attempt_in: match inner.state {
                CircuitState::Open => inner
                    .next_attempt
                    .map(|at| at.saturating_duration_since(now)),
                _ => None,
            },
            transitions: self.metrics.transitions.load(Ordering::Relaxed),
        }
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let total_calls = self.metrics.total_calls.load(Ordering::Relaxed);
        if total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_count = self.metrics.failure_count.load(Ordering::Relaxed);
        (failure_count as f64 / total_calls as f64) < 0.1
    }
}

/// Whether a classified error reflects trouble in the protected dependency
pub fn counts_as_backend_failure(err: &ClassifiedError) -> bool {
    use crate::error::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::Timeout
            | ErrorKind::DependencyUnavailable
            | ErrorKind::RateLimited
            | ErrorKind::Internal
    )
}

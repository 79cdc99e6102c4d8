//! # Error Taxonomy
//!
//! Every failure that crosses a component boundary in the lookup pipeline is a
//! [`ClassifiedError`]: a stable [`ErrorKind`] plus the message, retry hints and
//! status mapping the boundary layer needs. Raw failures reported by a backing
//! store are [`BackendError`]s and are translated exactly once, in
//! [`crate::degradation::classifier`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stable classification of a lookup failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Authorization,
    NotFound,
    Timeout,
    /// The backing store is failing (covers database errors)
    DependencyUnavailable,
    /// The circuit breaker is protecting the backing store
    CircuitOpen,
    RateLimited,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Authentication => "AUTHENTICATION",
            ErrorKind::Authorization => "AUTHORIZATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// HTTP-style status for the boundary layer
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 504,
            ErrorKind::DependencyUnavailable => 503,
            ErrorKind::CircuitOpen => 503,
            ErrorKind::RateLimited => 429,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether a failure of this kind may succeed if attempted again
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::DependencyUnavailable
                | ErrorKind::CircuitOpen
                | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure tagged with a stable kind and recovery hints.
///
/// `Clone` because every waiter attached to one in-flight execution receives
/// the identical error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    retry_after: Option<Duration>,
}

impl ClassifiedError {
    /// Create an error with the kind's default retryability
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable_by_default(),
            retry_after: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyUnavailable, message)
    }

    /// Rejection issued by an open circuit; `retry_after` is the time left
    /// until the breaker admits a probe.
    pub fn circuit_open(component: &str, retry_after: Duration) -> Self {
        Self::new(
            ErrorKind::CircuitOpen,
            format!("Circuit breaker is open for {component}"),
        )
        .with_retry_after(retry_after)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Raw failure reported by a backing store, before classification
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Backend operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend connection error: {0}")]
    Connection(String),

    #[error("Backend query error: {0}")]
    Query(String),

    #[error("Invalid lookup input: {0}")]
    InvalidInput(String),

    #[error("Backend rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type used throughout the lookup pipeline
pub type LookupResult<T> = Result<T, ClassifiedError>;

//! # Error Classification
//!
//! The single boundary where raw [`BackendError`]s become [`ClassifiedError`]s.
//! Database and connection failures map to `DEPENDENCY_UNAVAILABLE`; a store
//! that needs to report an authentication or authorization failure wraps a
//! `ClassifiedError` in `BackendError::Other`, which passes through unchanged.

use crate::error::{BackendError, ClassifiedError, ErrorKind};
use std::time::Duration;
use tracing::debug;

/// Translates backend failures, attaching retry hints per kind
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorClassifier {
    /// Suggested wait when a rate-limited backend gives no hint of its own
    pub rate_limit_delay: Duration,
    /// Suggested wait after connection or query failures, if any
    pub network_error_delay: Option<Duration>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_secs(60),
            network_error_delay: None,
        }
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn with_network_error_delay(mut self, delay: Duration) -> Self {
        self.network_error_delay = Some(delay);
        self
    }

    pub fn classify(&self, error: &BackendError) -> ClassifiedError {
        let classified = match error {
            BackendError::NotFound(what) => ClassifiedError::not_found(what.clone()),
            BackendError::Timeout(after) => {
                ClassifiedError::timeout(format!("Backend did not respond within {after:?}"))
            }
            BackendError::Connection(_) | BackendError::Query(_) => {
                let err = ClassifiedError::dependency_unavailable(error.to_string());
                match self.network_error_delay {
                    Some(delay) => err.with_retry_after(delay),
                    None => err,
                }
            }
            BackendError::InvalidInput(reason) => ClassifiedError::validation(reason.clone()),
            BackendError::RateLimited { retry_after } => {
                ClassifiedError::new(ErrorKind::RateLimited, "Backend rate limit exceeded")
                    .with_retry_after(retry_after.unwrap_or(self.rate_limit_delay))
            }
            BackendError::Other(inner) => match inner.downcast_ref::<ClassifiedError>() {
                Some(already) => already.clone(),
                None => ClassifiedError::internal(format!("{inner:#}")),
            },
        };

        debug!(
            kind = %classified.kind(),
            retryable = classified.is_retryable(),
            "Classified backend error"
        );
        classified
    }
}

/// Classify with the default hints
pub fn classify(error: &BackendError) -> ClassifiedError {
    ErrorClassifier::default().classify(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_errors_are_dependency_unavailable() {
        let err = classify(&BackendError::Query("deadlock detected".to_string()));
        assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), None);

        let err = ErrorClassifier::new()
            .with_network_error_delay(Duration::from_secs(5))
            .classify(&BackendError::Connection("refused".to_string()));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_rate_limit_hint_prefers_backend_value() {
        let err = classify(&BackendError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        });
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));

        let err = classify(&BackendError::RateLimited { retry_after: None });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_other_passes_classified_errors_through() {
        let denied = ClassifiedError::new(ErrorKind::Authorization, "role lacks risk:read");
        let err = classify(&BackendError::Other(anyhow::Error::new(denied.clone())));
        assert_eq!(err, denied);

        let err = classify(&BackendError::Other(anyhow::anyhow!("unexpected payload")));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.message().contains("unexpected payload"));
    }

    #[test]
    fn test_simple_mappings() {
        assert_eq!(
            classify(&BackendError::NotFound("profile".to_string())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify(&BackendError::Timeout(Duration::from_secs(2))).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify(&BackendError::InvalidInput("phone".to_string())).kind(),
            ErrorKind::Validation
        );
    }
}

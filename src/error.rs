//! Error taxonomy shared across the client.
//!
//! Single-item operations fail fast with one of these variants. Batch
//! operations never abort on the first error; they collect per-item failures
//! into a [`BatchOutcome`] and always run to completion.

use thiserror::Error;

/// Errors that can occur while talking to the Aura service.
#[derive(Debug, Error)]
pub enum AuraError {
    /// Bad credentials or an expired session. Fatal, never retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An expired or invalid AWS lease. The lease layer refreshes on this;
    /// it only reaches callers when the refresh itself fails.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// Timeouts, connection resets, 5xx responses. Retryable.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// Asset or attachment absent. Delete operations treat this as success.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed local input. Fatal, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A non-transient API rejection (4xx other than auth/not-found).
    #[error("api error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A retryable operation that kept failing until the attempt budget
    /// was spent. Wraps the last failure.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AuraError>,
    },

    /// The surrounding batch was cancelled before this operation finished.
    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuraError {
    /// Whether the retry policy may run the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuraError::Transient(_))
    }

    /// Map an HTTP status and response message into the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => AuraError::Authentication(message),
            403 => AuraError::Authorization(message),
            404 => AuraError::NotFound(message),
            408 | 429 => AuraError::Transient(format!("HTTP {status}: {message}")),
            s if s >= 500 => AuraError::Transient(format!("HTTP {status}: {message}")),
            s => AuraError::Api {
                status: s,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for AuraError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return AuraError::Transient(err.to_string());
        }
        if let Some(status) = err.status() {
            return AuraError::from_status(status.as_u16(), err.to_string());
        }
        AuraError::Transient(err.to_string())
    }
}

pub type Result<T, E = AuraError> = std::result::Result<T, E>;

/// One failed item inside a fail-soft batch.
#[derive(Debug)]
pub struct BatchItemError {
    /// Identifier of the item that failed (asset id or local identifier).
    pub item: String,
    pub error: AuraError,
}

/// Aggregate result of a fail-soft batch operation.
///
/// Every input item ends up in exactly one of the two lists.
#[derive(Debug, Default)]
pub struct BatchOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchItemError>,
}

impl<T> BatchOutcome<T> {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn record_success(&mut self, item: T) {
        self.succeeded.push(item);
    }

    pub fn record_failure(&mut self, item: impl Into<String>, error: AuraError) {
        self.failed.push(BatchItemError {
            item: item.into(),
            error,
        });
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            AuraError::from_status(401, "bad token"),
            AuraError::Authentication(_)
        ));
        assert!(matches!(
            AuraError::from_status(403, "expired"),
            AuraError::Authorization(_)
        ));
        assert!(matches!(
            AuraError::from_status(404, "gone"),
            AuraError::NotFound(_)
        ));
        assert!(matches!(
            AuraError::from_status(503, "unavailable"),
            AuraError::Transient(_)
        ));
        assert!(matches!(
            AuraError::from_status(422, "bad payload"),
            AuraError::Api { status: 422, .. }
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AuraError::Transient("timeout".into()).is_retryable());
        assert!(!AuraError::Authentication("nope".into()).is_retryable());
        assert!(!AuraError::Validation("empty".into()).is_retryable());
        assert!(!AuraError::Cancelled.is_retryable());
        assert!(!AuraError::RetriesExhausted {
            attempts: 3,
            source: Box::new(AuraError::Transient("t".into())),
        }
        .is_retryable());
    }

    #[test]
    fn test_batch_outcome_partitions_items() {
        let mut outcome = BatchOutcome::new();
        outcome.record_success("a");
        outcome.record_failure("b", AuraError::NotFound("b".into()));
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert!(!outcome.is_complete_success());
    }
}

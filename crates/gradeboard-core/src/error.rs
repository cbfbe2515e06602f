//! Engine error types.
//!
//! `StoreError` represents failures at the record-store boundary. It is
//! defined here rather than in `gradeboard-client` so the coordinator can
//! classify errors for retry decisions without string matching.

use thiserror::Error;

/// Errors that can occur when talking to the record store.
///
/// `Clone` so a single failed fetch can be handed to every caller attached
/// to the same in-flight request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store returned 401; the credential has been invalidated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The addressed record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store refused the request (4xx other than 401/404/429).
    #[error("rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The store returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The store failed internally (5xx).
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),
}

impl StoreError {
    /// Returns `true` if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Network(_)
                | StoreError::Timeout(_)
                | StoreError::RateLimited { .. }
                | StoreError::Api { .. }
        )
    }

    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            StoreError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Input rejected before any request is sent.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("score {score} is outside [0, {max_score}]")]
    ScoreOutOfRange { score: f64, max_score: f64 },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("weight must not be negative (got {0})")]
    NegativeWeight(f64),

    #[error("max score must be positive (got {0})")]
    NonPositiveMaxScore(f64),

    #[error("{field} must not be empty")]
    Empty { field: &'static str },
}

/// Errors surfaced by the coordinator to its callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A cache slot held a value of the wrong shape for its key.
    #[error("cache entry for {key} holds an unexpected value")]
    UnexpectedValue { key: String },
}

impl EngineError {
    /// The underlying store error, if this failure came from the store.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Network("reset".into()).is_transient());
        assert!(StoreError::Timeout(30).is_transient());
        assert!(StoreError::Api {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(StoreError::Unauthorized("expired".into()).is_permanent());
        assert!(StoreError::Rejected {
            status: 422,
            message: "bad score".into()
        }
        .is_permanent());
    }

    #[test]
    fn retry_after_only_for_rate_limit() {
        assert_eq!(
            StoreError::RateLimited {
                retry_after_ms: 2000
            }
            .retry_after_ms(),
            Some(2000)
        );
        assert_eq!(StoreError::Timeout(5).retry_after_ms(), None);
    }

    #[test]
    fn engine_error_wraps_store_error_transparently() {
        let err: EngineError = StoreError::NotFound("score sc-1".into()).into();
        assert_eq!(err.to_string(), "not found: score sc-1");
        assert!(err.store_error().is_some());
    }
}

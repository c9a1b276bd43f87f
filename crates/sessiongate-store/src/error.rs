//! Error types for refresh token storage

use std::time::Duration;

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Refresh token store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No live record exists for the token (absent, revoked, consumed or expired)
    #[error("Refresh token not found")]
    NotFound,

    /// The backing store could not be reached
    #[error("Refresh token store unavailable: {0}")]
    Unavailable(String),

    /// A backend call did not complete within its deadline
    #[error("Refresh token store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store rejected or failed an operation
    #[error("Refresh token store backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded
    #[error("Refresh token record serialization failed: {0}")]
    Serialization(String),

    /// The store was configured incorrectly
    #[error("Refresh token store configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Whether retrying the same call later may succeed
    ///
    /// Backend outages and timeouts are transient. A missing token, a corrupt
    /// record or a bad configuration will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::Backend(_)
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::NotFound => "not_found",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Timeout(_) => "timeout",
            StoreError::Backend(_) => "backend",
            StoreError::Serialization(_) => "serialization",
            StoreError::Configuration(_) => "configuration",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

#[cfg(feature = "redis-store")]
impl From<::redis::RedisError> for StoreError {
    fn from(error: ::redis::RedisError) -> Self {
        if error.is_connection_refusal()
            || error.is_connection_dropped()
            || error.is_io_error()
            || error.is_timeout()
        {
            StoreError::Unavailable(error.to_string())
        } else {
            StoreError::Backend(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        assert!(!StoreError::NotFound.is_transient());
        assert_eq!(StoreError::NotFound.category(), "not_found");

        let outage = StoreError::Unavailable("connection refused".to_string());
        assert!(outage.is_transient());
        assert_eq!(outage.category(), "unavailable");

        assert!(StoreError::Timeout(Duration::from_secs(2)).is_transient());
        assert!(!StoreError::Configuration("bad url".to_string()).is_transient());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        match StoreError::from(err) {
            StoreError::Serialization(msg) => assert!(!msg.is_empty()),
            other => panic!("Expected Serialization variant, got {other:?}"),
        }
    }
}

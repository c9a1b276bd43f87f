//! Refresh token records and the storage trait

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A stored refresh token and the session data it unlocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// The opaque refresh token string
    pub token: String,

    /// Caller data associated with the token (opaque to the store)
    pub user_data: Value,

    /// Absolute expiry instant
    pub expiry: DateTime<Utc>,

    /// Creation instant
    pub created: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Build a record created at `created`
    pub fn new(
        token: impl Into<String>,
        user_data: Value,
        expiry: DateTime<Utc>,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            user_data,
            expiry,
            created,
        }
    }

    /// A record is expired from its expiry instant onwards
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Remaining lifetime at `now`, `None` once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        (self.expiry - now).to_std().ok().filter(|d| !d.is_zero())
    }
}

/// Which storage backend is serving refresh tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local map
    Memory,
    /// Redis server
    Redis,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Redis => write!(f, "redis"),
        }
    }
}

/// Storage for refresh tokens
///
/// Implementations must be safe to share across tasks. Every method is a
/// single backend round-trip at most and never retries internally; dropping
/// the returned future abandons the call, and callers that want a deadline
/// wrap it in [`tokio::time::timeout`].
#[async_trait]
pub trait RefreshTokenStore: Send + Sync + fmt::Debug {
    /// Insert or replace the record for `token`
    async fn set(&self, token: &str, user_data: Value, expiry: DateTime<Utc>) -> Result<()>;

    /// User data for a live token
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) when the
    /// token is absent or its record has expired, even if the record has not
    /// been purged yet.
    async fn get(&self, token: &str) -> Result<Value>;

    /// Atomically remove a live token and return its record
    ///
    /// When several callers race on the same token at most one receives the
    /// record; the others see [`StoreError::NotFound`](crate::StoreError::NotFound).
    async fn take(&self, token: &str) -> Result<RefreshTokenRecord>;

    /// Remove a token; succeeds when the token is already gone
    async fn delete(&self, token: &str) -> Result<()>;

    /// Purge physically expired records, returning how many were removed
    async fn cleanup(&self) -> Result<usize>;

    /// Number of live records
    async fn count(&self) -> Result<usize>;

    /// The backend serving this store
    fn backend(&self) -> StoreBackend;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_expiry_boundary() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = RefreshTokenRecord::new(
            "abc",
            serde_json::json!({"user": "admin"}),
            created + Duration::seconds(60),
            created,
        );

        assert!(!record.is_expired_at(created + Duration::seconds(59)));
        assert!(record.is_expired_at(created + Duration::seconds(60)));
        assert_eq!(
            record.remaining_at(created + Duration::seconds(45)),
            Some(std::time::Duration::from_secs(15))
        );
        assert_eq!(record.remaining_at(created + Duration::seconds(60)), None);
    }

    #[test]
    fn test_record_json_shape() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = RefreshTokenRecord::new(
            "abc",
            serde_json::json!("alice"),
            created + Duration::hours(1),
            created,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["token"], "abc");
        assert_eq!(json["user_data"], "alice");

        let back: RefreshTokenRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(StoreBackend::Memory.to_string(), "memory");
        assert_eq!(StoreBackend::Redis.to_string(), "redis");
    }
}

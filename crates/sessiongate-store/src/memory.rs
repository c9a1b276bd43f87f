//! In-memory refresh token store
//!
//! A single [`parking_lot::Mutex`] guards the whole map, so every
//! read-check-write sequence (lazy expiry, take-for-rotation) happens under one
//! lock acquisition. Records are dropped when the process exits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, StoreError};
use crate::record::{RefreshTokenRecord, RefreshTokenStore, StoreBackend};

/// Process-local refresh token store
///
/// Memory is only reclaimed for expired tokens by [`RefreshTokenStore::cleanup`];
/// schedule it with [`crate::spawn_cleanup`] under sustained login volume.
#[derive(Debug, Clone)]
pub struct MemoryRefreshTokenStore {
    records: Arc<Mutex<HashMap<String, RefreshTokenRecord>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRefreshTokenStore {
    /// Create an empty store using the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that judges expiry with `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Total records held, including expired ones not yet purged
    pub fn stored_len(&self) -> usize {
        self.records.lock().len()
    }
}

impl Default for MemoryRefreshTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn set(&self, token: &str, user_data: Value, expiry: DateTime<Utc>) -> Result<()> {
        let record = RefreshTokenRecord::new(token, user_data, expiry, self.clock.now());
        self.records.lock().insert(token.to_string(), record);
        trace!("Stored refresh token in memory");
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Value> {
        let now = self.clock.now();
        let records = self.records.lock();
        match records.get(token) {
            Some(record) if !record.is_expired_at(now) => Ok(record.user_data.clone()),
            _ => Err(StoreError::NotFound),
        }
    }

    async fn take(&self, token: &str) -> Result<RefreshTokenRecord> {
        let now = self.clock.now();
        let record = self
            .records
            .lock()
            .remove(token)
            .ok_or(StoreError::NotFound)?;

        if record.is_expired_at(now) {
            return Err(StoreError::NotFound);
        }
        Ok(record)
    }

    async fn delete(&self, token: &str) -> Result<()> {
        self.records.lock().remove(token);
        Ok(())
    }

    async fn cleanup(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let initial_count = records.len();

        records.retain(|_, record| !record.is_expired_at(now));

        let purged = initial_count - records.len();
        debug!(purged, remaining = records.len(), "Purged expired refresh tokens");
        Ok(purged)
    }

    async fn count(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(self
            .records
            .lock()
            .values()
            .filter(|record| !record.is_expired_at(now))
            .count())
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store_with_clock() -> (MemoryRefreshTokenStore, ManualClock) {
        let clock = ManualClock::starting_now();
        (
            MemoryRefreshTokenStore::with_clock(Arc::new(clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (store, clock) = store_with_clock();
        let expiry = clock.now() + Duration::hours(1);

        store.set("t1", json!({"id": 7}), expiry).await.unwrap();
        assert_eq!(store.get("t1").await.unwrap(), json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_record() {
        let (store, clock) = store_with_clock();
        let expiry = clock.now() + Duration::hours(1);

        store.set("t1", json!("first"), expiry).await.unwrap();
        store.set("t1", json!("second"), expiry).await.unwrap();

        assert_eq!(store.get("t1").await.unwrap(), json!("second"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_record_reads_as_not_found_before_cleanup() {
        let (store, clock) = store_with_clock();
        store
            .set("t1", json!("alice"), clock.now() + Duration::seconds(10))
            .await
            .unwrap();

        clock.advance(std::time::Duration::from_secs(10));

        assert_eq!(store.get("t1").await, Err(StoreError::NotFound));
        assert_eq!(store.count().await.unwrap(), 0);
        // Still physically present until cleanup runs
        assert_eq!(store.stored_len(), 1);
    }

    #[tokio::test]
    async fn test_take_consumes_record_once() {
        let (store, clock) = store_with_clock();
        store
            .set("t1", json!("alice"), clock.now() + Duration::hours(1))
            .await
            .unwrap();

        let record = store.take("t1").await.unwrap();
        assert_eq!(record.token, "t1");
        assert_eq!(record.user_data, json!("alice"));
        assert_eq!(record.created, clock.now());

        assert_eq!(store.take("t1").await, Err(StoreError::NotFound));
        assert_eq!(store.get("t1").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_take_expired_record_is_not_found_and_purged() {
        let (store, clock) = store_with_clock();
        store
            .set("t1", json!("alice"), clock.now() + Duration::seconds(1))
            .await
            .unwrap();
        clock.advance(std::time::Duration::from_secs(2));

        assert_eq!(store.take("t1").await, Err(StoreError::NotFound));
        assert_eq!(store.stored_len(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, clock) = store_with_clock();
        store
            .set("t1", json!(null), clock.now() + Duration::hours(1))
            .await
            .unwrap();

        store.delete("t1").await.unwrap();
        store.delete("t1").await.unwrap();
        store.delete("never-existed").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_purges_only_expired() {
        let (store, clock) = store_with_clock();
        let now = clock.now();
        store.set("short", json!(1), now + Duration::seconds(5)).await.unwrap();
        store.set("long", json!(2), now + Duration::hours(5)).await.unwrap();

        clock.advance(std::time::Duration::from_secs(60));

        assert_eq!(store.cleanup().await.unwrap(), 1);
        assert_eq!(store.cleanup().await.unwrap(), 0);
        assert_eq!(store.stored_len(), 1);
        assert_eq!(store.get("long").await.unwrap(), json!(2));
    }

    #[test]
    fn test_get_after_repeated_delete_is_not_found() {
        let (store, clock) = store_with_clock();
        tokio_test::block_on(async {
            store.set("t1", json!(1), clock.now() + Duration::hours(1)).await.unwrap();
            tokio_test::assert_ok!(store.delete("t1").await);
            tokio_test::assert_ok!(store.delete("t1").await);
            tokio_test::assert_err!(store.get("t1").await);
        });
    }

    #[tokio::test]
    async fn test_backend_is_memory() {
        assert_eq!(MemoryRefreshTokenStore::new().backend(), StoreBackend::Memory);
    }
}

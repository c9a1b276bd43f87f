//! Redis integration tests for the refresh token store
//!
//! These run against a real Redis instance. Set `REDIS_TEST_URL`
//! (e.g. `redis://:password@localhost:16379`) to enable them; without it each
//! test returns early.
//!
//! These tests are only available when the redis-store feature is enabled.
#![cfg(feature = "redis-store")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as TimeDelta, Utc};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::json;
use serial_test::serial;
use sessiongate_store::{
    RedisConfig, RedisRefreshTokenStore, RefreshTokenStore, StoreBackend, StoreError,
};

use common::redis_test_config;

async fn connect(prefix: &str) -> Option<RedisRefreshTokenStore> {
    let config = redis_test_config(prefix)?;
    Some(
        RedisRefreshTokenStore::connect(&config)
            .await
            .expect("Failed to connect to Redis - ensure REDIS_TEST_URL points at a running server"),
    )
}

async fn clear(store: &RedisRefreshTokenStore, tokens: &[&str]) {
    for token in tokens {
        store.delete(token).await.unwrap();
    }
}

#[tokio::test]
#[serial]
async fn test_redis_store_lifecycle() {
    let Some(store) = connect("lifecycle").await else {
        return;
    };
    clear(&store, &["alpha", "beta"]).await;
    assert_eq!(store.backend(), StoreBackend::Redis);

    let expiry = Utc::now() + TimeDelta::minutes(10);
    store.set("alpha", json!({"user": "admin"}), expiry).await.unwrap();
    store.set("beta", json!("guest"), expiry).await.unwrap();

    assert_eq!(store.get("alpha").await.unwrap(), json!({"user": "admin"}));
    assert_eq!(store.count().await.unwrap(), 2);

    let record = store.take("alpha").await.unwrap();
    assert_eq!(record.token, "alpha");
    assert_eq!(store.take("alpha").await, Err(StoreError::NotFound));

    store.delete("beta").await.unwrap();
    store.delete("beta").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.cleanup().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_redis_store_expires_records() {
    let Some(store) = connect("expiry").await else {
        return;
    };
    clear(&store, &["short"]).await;

    store
        .set("short", json!(1), Utc::now() + TimeDelta::milliseconds(300))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(store.get("short").await, Err(StoreError::NotFound));

    // An already-past expiry never writes a record
    store
        .set("short", json!(1), Utc::now() - TimeDelta::seconds(1))
        .await
        .unwrap();
    assert_eq!(store.get("short").await, Err(StoreError::NotFound));
}

#[tokio::test]
#[serial]
async fn test_redis_client_cache_never_outlives_take() {
    let Some(base) = redis_test_config("cache") else {
        return;
    };
    let config: RedisConfig = base.with_client_cache(1024 * 1024, Duration::from_secs(60));
    let store = RedisRefreshTokenStore::connect(&config).await.unwrap();
    clear(&store, &["cached"]).await;

    let expiry = Utc::now() + TimeDelta::minutes(10);
    store.set("cached", json!("alice"), expiry).await.unwrap();
    // Warm the local cache
    assert_eq!(store.get("cached").await.unwrap(), json!("alice"));

    store.take("cached").await.unwrap();
    assert_eq!(store.get("cached").await, Err(StoreError::NotFound));
    assert_eq!(store.take("cached").await, Err(StoreError::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_redis_concurrent_take_has_single_winner() {
    let Some(store) = connect("race").await else {
        return;
    };
    let store = Arc::new(store);
    clear(&store, &["contested"]).await;

    store
        .set("contested", json!("carol"), Utc::now() + TimeDelta::minutes(10))
        .await
        .unwrap();

    let attempts = (0..16).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.take("contested").await })
    });
    let winners = join_all(attempts)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(winners, 1);
}

#[tokio::test]
#[serial]
async fn test_client_cache_does_not_outlive_revocation_elsewhere() {
    let Some(config) = redis_test_config("shared-cache") else {
        return;
    };
    let config = config.with_client_cache(1024 * 1024, Duration::from_secs(60));

    // GIVEN: Two processes sharing one Redis, each with its own client cache
    let replica_a = RedisRefreshTokenStore::connect(&config).await.unwrap();
    let replica_b = RedisRefreshTokenStore::connect(&config).await.unwrap();
    clear(&replica_a, &["shared", "rotated"]).await;

    let expiry = Utc::now() + TimeDelta::minutes(10);
    replica_a.set("shared", json!("dave"), expiry).await.unwrap();
    replica_a.set("rotated", json!("erin"), expiry).await.unwrap();

    // WHEN: B caches both tokens, then A revokes one and rotates the other
    assert_eq!(replica_b.get("shared").await.unwrap(), json!("dave"));
    assert_eq!(replica_b.get("rotated").await.unwrap(), json!("erin"));
    replica_a.delete("shared").await.unwrap();
    replica_a.take("rotated").await.unwrap();

    // THEN: B no longer treats either token as live
    assert_eq!(replica_b.get("shared").await, Err(StoreError::NotFound));
    assert_eq!(replica_b.get("rotated").await, Err(StoreError::NotFound));
}

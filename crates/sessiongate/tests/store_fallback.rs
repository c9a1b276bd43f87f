//! Store selection at engine initialization

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use sessiongate::{
    ManualClock, RedisConfig, RefreshTokenStore, SessionConfig, SessionEngineBuilder, StoreBackend,
};
use sessiongate_store::MemoryRefreshTokenStore;

use common::{admin_credentials, fixed_start, hs256_builder};

#[tokio::test]
async fn test_unreachable_redis_falls_back_to_memory() {
    // GIVEN: Redis configured at an address where nothing listens
    let clock = ManualClock::new(fixed_start());
    let builder = hs256_builder(&clock).with_redis_config(
        RedisConfig::default()
            .with_addr("127.0.0.1:1")
            .with_connect_timeout(Duration::from_millis(500)),
    );

    // WHEN: Building the engine
    let engine = builder.build().await.expect("initialization must not fail");

    // THEN: The in-memory store serves refresh tokens
    assert_eq!(engine.store_backend(), StoreBackend::Memory);
    assert_eq!(engine.store().count().await.unwrap(), 0);

    engine.login(&admin_credentials()).await.unwrap();
    assert_eq!(engine.store().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_injected_store_is_used() {
    let clock = ManualClock::new(fixed_start());
    let store = Arc::new(MemoryRefreshTokenStore::with_clock(Arc::new(clock.clone())));

    let engine = hs256_builder(&clock)
        .with_redis_addr("127.0.0.1:1")
        .store(store.clone())
        .build()
        .await
        .unwrap();

    let pair = engine.login(&admin_credentials()).await.unwrap().pair;
    assert!(store.get(&pair.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessiongate.yaml");
    std::fs::write(
        &path,
        "realm: files\nkeys:\n  secret: from-file\ntimeout: 120\nstore:\n  backend: memory\n",
    )
    .unwrap();

    let config = SessionConfig::from_file_with_prefix(&path, "SESSIONGATE_FILE_TEST").unwrap();
    let engine = SessionEngineBuilder::from_config(config).build().await.unwrap();

    assert_eq!(engine.www_authenticate(), "JWT realm=\"files\"");
    let pair = engine
        .generate_token_pair(serde_json::json!("batch"))
        .await
        .unwrap();
    assert_eq!(pair.expires_at.timestamp() - pair.created_at.timestamp(), 120);
}

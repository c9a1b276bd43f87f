//! Shared test utilities for sessiongate-store integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sessiongate_store::{ManualClock, MemoryRefreshTokenStore, RedisConfig};

/// Memory store plus a handle on its clock
pub fn memory_store_with_clock() -> (MemoryRefreshTokenStore, ManualClock) {
    let clock = ManualClock::new(fixed_start());
    (
        MemoryRefreshTokenStore::with_clock(Arc::new(clock.clone())),
        clock,
    )
}

/// A fixed, whole-second starting instant
pub fn fixed_start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).expect("valid timestamp")
}

/// An address where nothing listens
pub fn unreachable_redis() -> RedisConfig {
    RedisConfig::default()
        .with_addr("127.0.0.1:1")
        .with_connect_timeout(std::time::Duration::from_millis(500))
}

/// Redis settings for integration tests, `None` when `REDIS_TEST_URL` is unset
pub fn redis_test_config(prefix: &str) -> Option<RedisConfig> {
    std::env::var("REDIS_TEST_URL").ok().map(|url| {
        RedisConfig::default()
            .with_addr(url)
            .with_key_prefix(format!("sessiongate-test:{prefix}:"))
    })
}

//! Redis-backed refresh token store
//!
//! Records are stored as JSON under `<key_prefix><token>` with a millisecond
//! expiry, so Redis reclaims expired tokens on its own. Rotation uses `GETDEL`,
//! which makes the consume step atomic across every process sharing the server.
//!
//! When the client cache is enabled, [`RefreshTokenStore::get`] consults a
//! bounded local [`moka`] cache first, but a hit is only returned after an
//! `EXISTS` round-trip confirms the key is still live. Another process may have
//! revoked or rotated the token, and nothing invalidates this cache across
//! processes. The cache saves the `GET` payload and its deserialization only.
//! `take` always goes to Redis.

#[cfg(feature = "redis-store")]
pub use enabled::RedisRefreshTokenStore;

#[cfg(not(feature = "redis-store"))]
pub use disabled::RedisRefreshTokenStore;

#[cfg(feature = "redis-store")]
mod enabled {
    use std::fmt;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use moka::future::Cache;
    use redis::aio::MultiplexedConnection;
    use redis::{AsyncCommands, Client};
    use serde_json::Value;
    use tracing::{debug, info, trace};

    use crate::clock::{Clock, SystemClock};
    use crate::config::{ClientCacheConfig, RedisConfig};
    use crate::error::{Result, StoreError};
    use crate::record::{RefreshTokenRecord, RefreshTokenStore, StoreBackend};

    /// Refresh token store persisted in Redis
    #[derive(Clone)]
    pub struct RedisRefreshTokenStore {
        /// Shared multiplexed connection; clones are cheap handles
        connection: MultiplexedConnection,

        /// Namespace for refresh token keys
        key_prefix: String,

        /// Optional local read-through cache
        cache: Option<Cache<String, RefreshTokenRecord>>,

        clock: Arc<dyn Clock>,
    }

    impl fmt::Debug for RedisRefreshTokenStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RedisRefreshTokenStore")
                .field("key_prefix", &self.key_prefix)
                .field("client_cache", &self.cache.is_some())
                .finish_non_exhaustive()
        }
    }

    impl RedisRefreshTokenStore {
        /// Connect to Redis and verify the server answers `PING`
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Configuration`] for an unusable address,
        /// [`StoreError::Timeout`] when the connection is not established within
        /// `connect_timeout`, and [`StoreError::Unavailable`] when the server
        /// refuses or drops the connection.
        pub async fn connect(config: &RedisConfig) -> Result<Self> {
            Self::connect_with_clock(config, Arc::new(SystemClock)).await
        }

        /// Connect with a custom clock for expiry decisions
        ///
        /// # Errors
        ///
        /// Same as [`RedisRefreshTokenStore::connect`].
        pub async fn connect_with_clock(config: &RedisConfig, clock: Arc<dyn Clock>) -> Result<Self> {
            let url = config.connection_url()?;
            let client = Client::open(url.as_str())
                .map_err(|e| StoreError::Configuration(format!("Failed to create Redis client: {}", e)))?;

            let handshake = async {
                let mut connection = client.get_multiplexed_async_connection().await?;
                // Verify Redis is responsive
                let _: String = redis::cmd("PING").query_async(&mut connection).await?;
                Ok::<_, StoreError>(connection)
            };

            let connection = tokio::time::timeout(config.connect_timeout, handshake)
                .await
                .map_err(|_| StoreError::Timeout(config.connect_timeout))??;

            info!(
                addr = %config.addr,
                db = config.db,
                client_cache = config.client_cache.enabled,
                "Redis refresh token store connected"
            );

            Ok(Self {
                connection,
                key_prefix: config.key_prefix.clone(),
                cache: config.client_cache.enabled.then(|| build_cache(&config.client_cache)),
                clock,
            })
        }

        /// Key under which `token` is stored
        fn record_key(&self, token: &str) -> String {
            format!("{}{}", self.key_prefix, token)
        }

        async fn cache_get(&self, token: &str) -> Option<RefreshTokenRecord> {
            match &self.cache {
                Some(cache) => cache.get(token).await,
                None => None,
            }
        }

        async fn cache_invalidate(&self, token: &str) {
            if let Some(cache) = &self.cache {
                cache.invalidate(token).await;
            }
        }
    }

    fn build_cache(config: &ClientCacheConfig) -> Cache<String, RefreshTokenRecord> {
        Cache::builder()
            .max_capacity(config.size_bytes)
            .weigher(|token: &String, record: &RefreshTokenRecord| {
                // Token appears twice (key and record) plus the payload and timestamps
                let approx = token.len() * 2 + record.user_data.to_string().len() + 64;
                u32::try_from(approx).unwrap_or(u32::MAX)
            })
            .time_to_live(config.ttl)
            .build()
    }

    #[async_trait]
    impl RefreshTokenStore for RedisRefreshTokenStore {
        async fn set(&self, token: &str, user_data: Value, expiry: DateTime<Utc>) -> Result<()> {
            let now = self.clock.now();
            let record = RefreshTokenRecord::new(token, user_data, expiry, now);
            let key = self.record_key(token);
            let mut conn = self.connection.clone();

            let Some(ttl) = record.remaining_at(now) else {
                // Already expired: make sure nothing stale survives under this key
                let _: usize = conn.del(&key).await?;
                self.cache_invalidate(token).await;
                return Ok(());
            };

            let serialized = serde_json::to_string(&record)?;
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let _: () = conn.pset_ex(&key, serialized, ttl_ms).await?;

            if let Some(cache) = &self.cache {
                cache.insert(token.to_string(), record).await;
            }
            trace!(ttl_ms, "Stored refresh token in Redis");
            Ok(())
        }

        async fn get(&self, token: &str) -> Result<Value> {
            let now = self.clock.now();

            let mut conn = self.connection.clone();

            if let Some(record) = self.cache_get(token).await {
                if !record.is_expired_at(now) {
                    let live: bool = conn.exists(self.record_key(token)).await?;
                    if live {
                        return Ok(record.user_data);
                    }
                    trace!("Dropped cached refresh token missing from Redis");
                    self.cache_invalidate(token).await;
                    return Err(StoreError::NotFound);
                }
                self.cache_invalidate(token).await;
            }

            let raw: Option<String> = conn.get(self.record_key(token)).await?;
            let Some(raw) = raw else {
                return Err(StoreError::NotFound);
            };

            let record: RefreshTokenRecord = serde_json::from_str(&raw)?;
            if record.is_expired_at(now) {
                return Err(StoreError::NotFound);
            }

            let user_data = record.user_data.clone();
            if let Some(cache) = &self.cache {
                cache.insert(token.to_string(), record).await;
            }
            Ok(user_data)
        }

        async fn take(&self, token: &str) -> Result<RefreshTokenRecord> {
            // Invalidate first so no reader is served the consumed record locally
            self.cache_invalidate(token).await;

            let mut conn = self.connection.clone();
            let raw: Option<String> = conn.get_del(self.record_key(token)).await?;
            let Some(raw) = raw else {
                return Err(StoreError::NotFound);
            };

            let record: RefreshTokenRecord = serde_json::from_str(&raw)?;
            if record.is_expired_at(self.clock.now()) {
                return Err(StoreError::NotFound);
            }
            Ok(record)
        }

        async fn delete(&self, token: &str) -> Result<()> {
            self.cache_invalidate(token).await;

            let mut conn = self.connection.clone();
            let removed: usize = conn.del(self.record_key(token)).await?;
            trace!(removed, "Deleted refresh token from Redis");
            Ok(())
        }

        async fn cleanup(&self) -> Result<usize> {
            // Redis expires keys on its own via PX
            if let Some(cache) = &self.cache {
                cache.run_pending_tasks().await;
            }
            debug!("Redis TTL handles automatic cleanup of expired refresh tokens");
            Ok(0)
        }

        async fn count(&self) -> Result<usize> {
            let mut conn = self.connection.clone();
            let pattern = format!("{}*", self.key_prefix);

            // SCAN instead of KEYS to avoid blocking Redis
            let mut count = 0usize;
            let mut keys: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
            while let Some(key) = keys.next_item().await {
                key?;
                count += 1;
            }
            Ok(count)
        }

        fn backend(&self) -> StoreBackend {
            StoreBackend::Redis
        }
    }
}

/// Redis store placeholder when the `redis-store` feature is disabled
#[cfg(not(feature = "redis-store"))]
mod disabled {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::Value;

    use crate::clock::Clock;
    use crate::config::RedisConfig;
    use crate::error::{Result, StoreError};
    use crate::record::{RefreshTokenRecord, RefreshTokenStore, StoreBackend};

    /// Redis storage implementation when feature is disabled
    ///
    /// Every constructor fails with a configuration error naming the feature
    /// to enable.
    #[derive(Debug)]
    pub struct RedisRefreshTokenStore;

    impl RedisRefreshTokenStore {
        /// Always fails: the `redis-store` feature is not enabled
        ///
        /// # Errors
        ///
        /// Always returns [`StoreError::Configuration`].
        pub async fn connect(config: &RedisConfig) -> Result<Self> {
            Self::connect_with_clock(config, Arc::new(crate::clock::SystemClock)).await
        }

        /// Always fails: the `redis-store` feature is not enabled
        ///
        /// # Errors
        ///
        /// Always returns [`StoreError::Configuration`].
        pub async fn connect_with_clock(_config: &RedisConfig, _clock: Arc<dyn Clock>) -> Result<Self> {
            Err(feature_disabled())
        }
    }

    fn feature_disabled() -> StoreError {
        StoreError::Configuration(
            "Redis store feature not enabled. Enable the 'redis-store' feature in Cargo.toml to use the Redis backend."
                .to_string(),
        )
    }

    #[async_trait]
    impl RefreshTokenStore for RedisRefreshTokenStore {
        async fn set(&self, _token: &str, _user_data: Value, _expiry: DateTime<Utc>) -> Result<()> {
            Err(feature_disabled())
        }

        async fn get(&self, _token: &str) -> Result<Value> {
            Err(feature_disabled())
        }

        async fn take(&self, _token: &str) -> Result<RefreshTokenRecord> {
            Err(feature_disabled())
        }

        async fn delete(&self, _token: &str) -> Result<()> {
            Err(feature_disabled())
        }

        async fn cleanup(&self) -> Result<usize> {
            Err(feature_disabled())
        }

        async fn count(&self) -> Result<usize> {
            Err(feature_disabled())
        }

        fn backend(&self) -> StoreBackend {
            StoreBackend::Redis
        }
    }
}

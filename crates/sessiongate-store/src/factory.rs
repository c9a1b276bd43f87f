//! Store construction from configuration
//!
//! [`new_store`] reports every failure. [`new_store_or_fallback`] never fails:
//! when the configured Redis backend cannot be reached it logs a warning and
//! hands back an in-memory store, trading revocation durability across
//! restarts for availability.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::memory::MemoryRefreshTokenStore;
use crate::record::RefreshTokenStore;
use crate::redis_store::RedisRefreshTokenStore;

/// Build the configured store
///
/// # Errors
///
/// Returns the backend's connection or configuration error.
pub async fn new_store(config: &StoreConfig) -> Result<Arc<dyn RefreshTokenStore>> {
    new_store_with_clock(config, Arc::new(SystemClock)).await
}

/// Build the configured store with a custom clock
///
/// # Errors
///
/// Returns the backend's connection or configuration error.
pub async fn new_store_with_clock(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn RefreshTokenStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryRefreshTokenStore::with_clock(clock))),
        StoreConfig::Redis(redis) => {
            let store = RedisRefreshTokenStore::connect_with_clock(redis, clock).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the configured store, falling back to memory if the backend fails
pub async fn new_store_or_fallback(config: &StoreConfig) -> Arc<dyn RefreshTokenStore> {
    new_store_or_fallback_with_clock(config, Arc::new(SystemClock)).await
}

/// Build the configured store with a custom clock, falling back to memory
pub async fn new_store_or_fallback_with_clock(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> Arc<dyn RefreshTokenStore> {
    match new_store_with_clock(config, clock.clone()).await {
        Ok(store) => {
            info!(backend = %store.backend(), "Refresh token store ready");
            store
        }
        Err(error) => {
            warn!(
                error = %error,
                category = error.category(),
                "Refresh token store backend unavailable, falling back to in-memory store"
            );
            Arc::new(MemoryRefreshTokenStore::with_clock(clock))
        }
    }
}

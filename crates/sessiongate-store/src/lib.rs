//! # Sessiongate Store
//!
//! Server-side storage for refresh tokens issued by the sessiongate engine.
//!
//! Refresh tokens are opaque strings mapped to a [`RefreshTokenRecord`]. Callers
//! program against the [`RefreshTokenStore`] trait; two implementations ship with
//! this crate:
//!
//! - [`MemoryRefreshTokenStore`]: a mutex-guarded map, always available
//! - [`RedisRefreshTokenStore`]: Redis-backed with an optional local read-through
//!   cache (requires the `redis-store` feature)
//!
//! Expired records read as [`StoreError::NotFound`] even before they are purged.
//! Purging is explicit: call [`RefreshTokenStore::cleanup`] yourself or run
//! [`spawn_cleanup`] with a cancellation token you own.
//!
//! ## Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use sessiongate_store::{MemoryRefreshTokenStore, RefreshTokenStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sessiongate_store::StoreError> {
//! let store = MemoryRefreshTokenStore::new();
//! let expiry = Utc::now() + Duration::days(30);
//!
//! store.set("token-abc", serde_json::json!({"user": "admin"}), expiry).await?;
//! assert_eq!(store.count().await?, 1);
//!
//! let record = store.take("token-abc").await?;
//! assert_eq!(record.user_data["user"], "admin");
//! assert!(store.get("token-abc").await.is_err());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cleanup;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod memory;
pub mod record;
pub mod redis_store;

pub use cleanup::spawn_cleanup;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientCacheConfig, RedisConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use factory::{
    new_store, new_store_or_fallback, new_store_or_fallback_with_clock, new_store_with_clock,
};
pub use memory::MemoryRefreshTokenStore;
pub use record::{RefreshTokenRecord, RefreshTokenStore, StoreBackend};
pub use redis_store::RedisRefreshTokenStore;

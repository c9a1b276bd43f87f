//! Store configuration
//!
//! Durations serialize as whole seconds so configuration files stay readable:
//!
//! ```toml
//! [store]
//! backend = "redis"
//! addr = "cache.internal:6379"
//! db = 2
//! key_prefix = "myapp:refresh:"
//! connect_timeout = 3
//!
//! [store.client_cache]
//! enabled = true
//! size_bytes = 67108864
//! ttl = 30
//! ```

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StoreError};

/// Default Redis address
pub const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

/// Default namespace for refresh token keys
pub const DEFAULT_KEY_PREFIX: &str = "sessiongate:";

/// Default client-side cache capacity (128 MiB)
pub const DEFAULT_CLIENT_CACHE_SIZE: u64 = 128 * 1024 * 1024;

/// Which backend stores refresh tokens
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local map
    #[default]
    Memory,
    /// Redis server
    Redis(RedisConfig),
}

impl StoreConfig {
    /// Redis store with default settings
    pub fn redis() -> Self {
        StoreConfig::Redis(RedisConfig::default())
    }

    /// Redis store at `addr`
    pub fn redis_at(addr: impl Into<String>) -> Self {
        StoreConfig::Redis(RedisConfig::default().with_addr(addr))
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Server address, `host:port` or a full `redis://` / `rediss://` URL
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Server password (empty for none)
    #[serde(
        default = "empty_secret",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub password: SecretString,

    /// Database index
    #[serde(default)]
    pub db: i64,

    /// Prefix prepended to every refresh token key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on establishing the initial connection
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Local read-through cache
    #[serde(default)]
    pub client_cache: ClientCacheConfig,
}

/// Local read-through cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCacheConfig {
    /// Whether lookups consult a local cache before Redis
    #[serde(default)]
    pub enabled: bool,

    /// Approximate capacity in bytes
    #[serde(default = "default_cache_size")]
    pub size_bytes: u64,

    /// How long an entry may be served without asking Redis again
    #[serde(default = "default_cache_ttl", with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            password: empty_secret(),
            db: 0,
            key_prefix: default_key_prefix(),
            connect_timeout: default_connect_timeout(),
            client_cache: ClientCacheConfig::default(),
        }
    }
}

impl Default for ClientCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_bytes: default_cache_size(),
            ttl: default_cache_ttl(),
        }
    }
}

impl RedisConfig {
    /// Set the server address
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Set address, password and database in one call
    pub fn with_options(mut self, addr: impl Into<String>, password: impl Into<String>, db: i64) -> Self {
        self.addr = addr.into();
        self.password = SecretString::new(password.into());
        self.db = db;
        self
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable the local read-through cache with the given capacity and TTL
    pub fn with_client_cache(mut self, size_bytes: u64, ttl: Duration) -> Self {
        self.client_cache = ClientCacheConfig {
            enabled: true,
            size_bytes,
            ttl,
        };
        self
    }

    /// Build the connection URL from address, password and database
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] when the address cannot form a
    /// valid Redis URL.
    pub fn connection_url(&self) -> Result<Url> {
        let raw = if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| StoreError::Configuration(format!("invalid Redis address '{}': {}", self.addr, e)))?;

        if !matches!(url.scheme(), "redis" | "rediss") {
            return Err(StoreError::Configuration(format!(
                "unsupported Redis URL scheme '{}'",
                url.scheme()
            )));
        }

        let password = self.password.expose_secret();
        if !password.is_empty() {
            url.set_password(Some(password))
                .map_err(|()| StoreError::Configuration("Redis address cannot carry a password".to_string()))?;
        }
        if self.db != 0 {
            url.set_path(&format!("/{}", self.db));
        }

        Ok(url)
    }
}

fn default_addr() -> String {
    DEFAULT_REDIS_ADDR.to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_cache_size() -> u64 {
    DEFAULT_CLIENT_CACHE_SIZE
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

// Custom serialization for SecretString
fn serialize_secret<S>(secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

// Custom deserialization for SecretString
fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::new(s))
}

/// Serialize a [`Duration`] as whole seconds
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize as seconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    /// Deserialize from seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

//! Engine builder
//!
//! ```rust
//! use std::time::Duration;
//! use serde_json::{Value, json};
//! use sessiongate::{AuthenticationError, SessionEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sessiongate::SessionError> {
//! let engine = SessionEngine::builder()
//!     .realm("accounts")
//!     .secret("change-me")
//!     .timeout(Duration::from_secs(15 * 60))
//!     .max_refresh(Duration::from_secs(7 * 24 * 60 * 60))
//!     .authenticator(|credentials: &Value| {
//!         if credentials["username"] == "admin" && credentials["password"] == "admin" {
//!             Ok(json!({"user": "admin"}))
//!         } else {
//!             Err(AuthenticationError::FailedAuthentication)
//!         }
//!     })
//!     .build()
//!     .await?;
//!
//! let grant = engine.login(&json!({"username": "admin", "password": "admin"})).await?;
//! assert_eq!(grant.pair.token_type, "Bearer");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ring::rand::SystemRandom;
use secrecy::SecretString;
use sessiongate_store::{
    Clock, RedisConfig, RefreshTokenStore, StoreConfig, SystemClock, new_store_or_fallback_with_clock,
};

use crate::callbacks::{
    Authenticator, Authorizer, IdentityHandler, PayloadFn, TimeoutFn, allow_all,
    default_identity_handler, default_payload, fixed_timeout,
};
use crate::claims::AccessClaims;
use crate::codec::TokenCodec;
use crate::config::SessionConfig;
use crate::cookie::CookieConfig;
use crate::engine::{EngineInner, SessionEngine};
use crate::error::{ConfigError, SessionResult};
use crate::extractor::{RequestContext, TokenLookup};
use crate::keys::{KeyManager, KeyResolver, SigningAlgorithm};

/// Builder for [`SessionEngine`]
///
/// Starts from [`SessionConfig::default`]; every serializable setting has a
/// setter, and callbacks, clocks, stores and key resolvers are attached here.
pub struct SessionEngineBuilder {
    config: SessionConfig,
    token_lookup: Option<String>,
    refresh_token_lookup: Option<String>,
    store: Option<Arc<dyn RefreshTokenStore>>,
    clock: Option<Arc<dyn Clock>>,
    key_resolver: Option<Arc<dyn KeyResolver>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    payload: Option<PayloadFn>,
    identity_handler: Option<IdentityHandler>,
    authorizer: Option<Authorizer>,
    timeout_fn: Option<TimeoutFn>,
}

impl std::fmt::Debug for SessionEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngineBuilder")
            .field("config", &self.config)
            .field("token_lookup", &self.token_lookup)
            .field("has_store", &self.store.is_some())
            .field("has_key_resolver", &self.key_resolver.is_some())
            .field("has_authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionEngineBuilder {
    /// Builder with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(SessionConfig::default())
    }

    /// Builder starting from loaded settings
    #[must_use]
    pub fn from_config(config: SessionConfig) -> Self {
        Self {
            config,
            token_lookup: None,
            refresh_token_lookup: None,
            store: None,
            clock: None,
            key_resolver: None,
            authenticator: None,
            payload: None,
            identity_handler: None,
            authorizer: None,
            timeout_fn: None,
        }
    }

    /// Realm reported in `WWW-Authenticate`
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = realm.into();
        self
    }

    /// Signing algorithm
    #[must_use]
    pub fn signing_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.config.signing_algorithm = algorithm;
        self
    }

    /// Shared secret for HMAC algorithms
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.keys.secret = Some(SecretString::new(secret.into()));
        self
    }

    /// PEM private key file
    pub fn private_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.keys.private_key_file = Some(path.into());
        self
    }

    /// Inline PEM private key
    pub fn private_key(mut self, pem: impl Into<String>) -> Self {
        self.config.keys.private_key = Some(SecretString::new(pem.into()));
        self
    }

    /// Passphrase for an encrypted PKCS#8 private key
    pub fn private_key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.config.keys.private_key_passphrase = Some(SecretString::new(passphrase.into()));
        self
    }

    /// PEM public key file
    pub fn public_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.keys.public_key_file = Some(path.into());
        self
    }

    /// Inline PEM public key
    pub fn public_key(mut self, pem: impl Into<String>) -> Self {
        self.config.keys.public_key = Some(pem.into());
        self
    }

    /// Defer key selection to `resolver`; configured key material is ignored
    #[must_use]
    pub fn key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = Some(resolver);
        self
    }

    /// Access token lifetime
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Compute the access token lifetime per token
    #[must_use]
    pub fn timeout_fn<F>(mut self, timeout_fn: F) -> Self
    where
        F: Fn(&AccessClaims) -> Duration + Send + Sync + 'static,
    {
        self.timeout_fn = Some(Arc::new(timeout_fn));
        self
    }

    /// Refresh window measured from the session's original issue time
    #[must_use]
    pub fn max_refresh(mut self, max_refresh: Duration) -> Self {
        self.config.max_refresh = max_refresh;
        self
    }

    /// Refresh token lifetime
    #[must_use]
    pub fn refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.config.refresh_token_ttl = ttl;
        self
    }

    /// Access token lookup rules, e.g. `"header:Authorization, query:token"`
    ///
    /// Parsed by [`build`](Self::build).
    pub fn token_lookup(mut self, rules: impl Into<String>) -> Self {
        self.token_lookup = Some(rules.into());
        self
    }

    /// Refresh token lookup rules
    ///
    /// Parsed by [`build`](Self::build).
    pub fn refresh_token_lookup(mut self, rules: impl Into<String>) -> Self {
        self.refresh_token_lookup = Some(rules.into());
        self
    }

    /// Prefix expected before the token in header sources
    pub fn token_head_name(mut self, head_name: impl Into<String>) -> Self {
        self.config.token_head_name = head_name.into();
        self
    }

    /// Claim holding the identity payload
    pub fn identity_key(mut self, key: impl Into<String>) -> Self {
        self.config.identity_key = key.into();
        self
    }

    /// Claim holding the expiry timestamp
    pub fn exp_field(mut self, field: impl Into<String>) -> Self {
        self.config.exp_field = field.into();
        self
    }

    /// Echo `Authorization` for validated requests
    #[must_use]
    pub fn send_authorization(mut self, enabled: bool) -> Self {
        self.config.send_authorization = enabled;
        self
    }

    /// Deliver tokens as cookies with default cookie settings
    #[must_use]
    pub fn send_cookie(mut self, enabled: bool) -> Self {
        self.config.cookies.send_cookie = enabled;
        self
    }

    /// Cookie settings
    #[must_use]
    pub fn cookies(mut self, cookies: CookieConfig) -> Self {
        self.config.cookies = cookies;
        self
    }

    /// Store refresh tokens in Redis at the default address
    #[must_use]
    pub fn with_redis(mut self) -> Self {
        self.config.store = StoreConfig::redis();
        self
    }

    /// Store refresh tokens in Redis at `addr`
    pub fn with_redis_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.store = StoreConfig::redis_at(addr);
        self
    }

    /// Store refresh tokens in Redis with credentials and database index
    pub fn with_redis_options(
        mut self,
        addr: impl Into<String>,
        password: impl Into<String>,
        db: i64,
    ) -> Self {
        self.config.store = StoreConfig::Redis(self.redis_config().with_options(addr, password, db));
        self
    }

    /// Store refresh tokens in Redis with full settings
    #[must_use]
    pub fn with_redis_config(mut self, redis: RedisConfig) -> Self {
        self.config.store = StoreConfig::Redis(redis);
        self
    }

    /// Enable the local read-through cache in front of Redis
    #[must_use]
    pub fn with_redis_client_cache(mut self, size_bytes: u64, ttl: Duration) -> Self {
        self.config.store = StoreConfig::Redis(self.redis_config().with_client_cache(size_bytes, ttl));
        self
    }

    /// Use `store` instead of building one from the store settings
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RefreshTokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Clock for issuance, expiry and refresh window checks
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Credential check for [`SessionEngine::login`]
    #[must_use]
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Map user data to access token claims
    #[must_use]
    pub fn payload<F>(mut self, payload: F) -> Self
    where
        F: Fn(&serde_json::Value) -> AccessClaims + Send + Sync + 'static,
    {
        self.payload = Some(Arc::new(payload));
        self
    }

    /// Derive the identity from verified claims
    #[must_use]
    pub fn identity_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&AccessClaims) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        self.identity_handler = Some(Arc::new(handler));
        self
    }

    /// Decide whether an identity may perform a request
    #[must_use]
    pub fn authorizer<F>(mut self, authorizer: F) -> Self
    where
        F: Fn(Option<&serde_json::Value>, &RequestContext) -> bool + Send + Sync + 'static,
    {
        self.authorizer = Some(Arc::new(authorizer));
        self
    }

    fn redis_config(&self) -> RedisConfig {
        match &self.config.store {
            StoreConfig::Redis(redis) => redis.clone(),
            StoreConfig::Memory => RedisConfig::default(),
        }
    }

    /// Resolve keys, connect the store and assemble the engine
    ///
    /// A store backend that cannot be reached is replaced by the in-memory
    /// store; key problems are fatal.
    ///
    /// # Errors
    ///
    /// [`SessionError::Config`](crate::SessionError::Config) for invalid
    /// settings or lookup rules, [`SessionError::Key`](crate::SessionError::Key)
    /// for unusable key material.
    pub async fn build(self) -> SessionResult<SessionEngine> {
        let mut config = self.config;

        if let Some(rules) = self.token_lookup {
            config.token_lookup = TokenLookup::parse(&rules)
                .map_err(|e| ConfigError::Invalid(format!("token_lookup: {e}")))?;
        }
        if let Some(rules) = self.refresh_token_lookup {
            config.refresh_token_lookup = Some(
                TokenLookup::parse(&rules)
                    .map_err(|e| ConfigError::Invalid(format!("refresh_token_lookup: {e}")))?,
            );
        }
        config.validate()?;

        let keys = match self.key_resolver {
            Some(resolver) => KeyManager::from_resolver(config.signing_algorithm, resolver),
            None => KeyManager::load(config.signing_algorithm, &config.keys).await?,
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let codec = TokenCodec::new(keys)
            .with_clock(clock.clone())
            .with_expiry_field(config.exp_field.clone());

        let store = match self.store {
            Some(store) => store,
            None => new_store_or_fallback_with_clock(&config.store, clock).await,
        };

        let engine = SessionEngine::from_inner(EngineInner {
            token_lookup: config.token_lookup.clone(),
            refresh_token_lookup: config.effective_refresh_token_lookup(),
            authenticator: self.authenticator,
            payload: self
                .payload
                .unwrap_or_else(|| default_payload(&config.identity_key)),
            identity_handler: self
                .identity_handler
                .unwrap_or_else(|| default_identity_handler(&config.identity_key)),
            authorizer: self.authorizer.unwrap_or_else(allow_all),
            timeout: self.timeout_fn.unwrap_or_else(|| fixed_timeout(config.timeout)),
            random: SystemRandom::new(),
            codec,
            store,
            config,
        });

        engine.log_ready();
        Ok(engine)
    }
}

impl Default for SessionEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

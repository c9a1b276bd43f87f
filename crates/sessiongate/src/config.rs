//! Engine configuration
//!
//! [`SessionConfig`] holds every serializable setting. Callbacks, custom
//! stores, key resolvers and clocks are attached through
//! [`SessionEngineBuilder`](crate::SessionEngineBuilder).
//!
//! ```toml
//! realm = "accounts"
//! signing_algorithm = "HS512"
//! timeout = 900
//! max_refresh = 604800
//! token_lookup = "header:Authorization, cookie:jwt"
//!
//! [keys]
//! secret = "change-me"
//!
//! [cookies]
//! send_cookie = true
//! domain = "example.com"
//!
//! [store]
//! backend = "redis"
//! addr = "cache:6379"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sessiongate_store::StoreConfig;
use sessiongate_store::config::duration_secs;

use crate::claims::DEFAULT_EXPIRY_FIELD;
use crate::cookie::CookieConfig;
use crate::error::ConfigError;
use crate::extractor::TokenLookup;
use crate::keys::{KeyConfig, SigningAlgorithm};

/// Default realm reported in `WWW-Authenticate`
pub const DEFAULT_REALM: &str = "sessiongate";

/// Default `Authorization` header prefix
pub const DEFAULT_TOKEN_HEAD_NAME: &str = "Bearer";

/// Default claim holding the identity payload
pub const DEFAULT_IDENTITY_KEY: &str = "identity";

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "SESSIONGATE";

/// Session engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Realm reported to clients on authentication failures
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Signing algorithm for access tokens
    #[serde(default)]
    pub signing_algorithm: SigningAlgorithm,

    /// Key material for the signing algorithm
    #[serde(default)]
    pub keys: KeyConfig,

    /// Access token lifetime
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Longest a session may be refreshed, measured from its original issue time
    #[serde(default = "default_max_refresh", with = "duration_secs")]
    pub max_refresh: Duration,

    /// Refresh token lifetime
    #[serde(default = "default_refresh_token_ttl", with = "duration_secs")]
    pub refresh_token_ttl: Duration,

    /// Where to find access tokens in a request
    #[serde(default)]
    pub token_lookup: TokenLookup,

    /// Where to find refresh tokens; defaults to cookie, form, JSON body, then query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token_lookup: Option<TokenLookup>,

    /// Prefix expected before the token in header sources
    #[serde(default = "default_token_head_name")]
    pub token_head_name: String,

    /// Claim holding the identity payload
    #[serde(default = "default_identity_key")]
    pub identity_key: String,

    /// Claim holding the expiry timestamp
    #[serde(default = "default_expiry_field")]
    pub exp_field: String,

    /// Echo `Authorization: <HeadName> <token>` for validated requests
    #[serde(default)]
    pub send_authorization: bool,

    /// Cookie delivery
    #[serde(default)]
    pub cookies: CookieConfig,

    /// Refresh token storage backend
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            signing_algorithm: SigningAlgorithm::default(),
            keys: KeyConfig::default(),
            timeout: default_timeout(),
            max_refresh: default_max_refresh(),
            refresh_token_ttl: default_refresh_token_ttl(),
            token_lookup: TokenLookup::default(),
            refresh_token_lookup: None,
            token_head_name: default_token_head_name(),
            identity_key: default_identity_key(),
            exp_field: default_expiry_field(),
            send_authorization: false,
            cookies: CookieConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is detected from the extension. Environment variables
    /// with the `SESSIONGATE_` prefix override file settings, using `__` for
    /// nesting (e.g. `SESSIONGATE_KEYS__SECRET`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, has an unsupported
    /// extension, or contains invalid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`SessionConfig::from_file`].
    pub fn from_file_with_prefix(path: impl AsRef<Path>, env_prefix: &str) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check settings that cannot be expressed in types
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_head_name.trim().is_empty() {
            return Err(ConfigError::Invalid("token_head_name must not be empty".to_string()));
        }
        if self.identity_key.is_empty() {
            return Err(ConfigError::Invalid("identity_key must not be empty".to_string()));
        }
        if self.exp_field.is_empty() {
            return Err(ConfigError::Invalid("exp_field must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be greater than zero".to_string()));
        }
        if self.refresh_token_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "refresh_token_ttl must be greater than zero".to_string(),
            ));
        }
        if self.token_lookup.sources().is_empty() {
            return Err(ConfigError::Invalid("token_lookup has no sources".to_string()));
        }
        if self
            .refresh_token_lookup
            .as_ref()
            .is_some_and(|lookup| lookup.sources().is_empty())
        {
            return Err(ConfigError::Invalid(
                "refresh_token_lookup has no sources".to_string(),
            ));
        }
        Ok(())
    }

    /// Refresh token lookup, derived from the refresh cookie name when unset
    pub fn effective_refresh_token_lookup(&self) -> TokenLookup {
        use crate::extractor::TokenSource;

        self.refresh_token_lookup.clone().unwrap_or_else(|| {
            TokenLookup::new(vec![
                TokenSource::Cookie(self.cookies.refresh_name.clone()),
                TokenSource::Form("refresh_token".to_string()),
                TokenSource::Json("refresh_token".to_string()),
                TokenSource::Query("refresh_token".to_string()),
            ])
        })
    }
}

fn default_realm() -> String {
    DEFAULT_REALM.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_max_refresh() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_refresh_token_ttl() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

fn default_token_head_name() -> String {
    DEFAULT_TOKEN_HEAD_NAME.to_string()
}

fn default_identity_key() -> String {
    DEFAULT_IDENTITY_KEY.to_string()
}

fn default_expiry_field() -> String {
    DEFAULT_EXPIRY_FIELD.to_string()
}

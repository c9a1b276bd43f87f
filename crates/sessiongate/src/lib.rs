//! # Sessiongate
//!
//! Signed access tokens paired with rotating, revocable refresh tokens.
//!
//! An access token is a short-lived JWT presented on every request. A refresh
//! token is an opaque random string stored server-side and exchanged, exactly
//! once, for a new pair. Each pair remembers when its session began
//! (`orig_iat`); once that is older than the refresh window no further
//! rotation is possible.
//!
//! ## Architecture
//!
//! - [`keys`] - Signing algorithms and key material (HMAC, RSA, RSA-PSS, ECDSA)
//! - [`codec`] - Issuing and verifying access tokens against an injectable clock
//! - [`extractor`] - Finding tokens in headers, query strings, cookies, path
//!   parameters, form and JSON bodies
//! - [`engine`] - Login, validation, refresh with rotation, logout
//! - [`builder`] - Engine assembly, key loading and store selection
//! - [`cookie`] - `Set-Cookie` directives for cookie delivery
//! - [`config`] - File and environment configuration
//!
//! Refresh tokens live in a [`RefreshTokenStore`] from `sessiongate-store`.
//! A Redis store that cannot be reached at startup is replaced with the
//! in-memory store rather than failing initialization.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::{Value, json};
//! use sessiongate::{AuthenticationError, RequestContext, SessionEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sessiongate::SessionError> {
//! let engine = SessionEngine::builder()
//!     .secret("secret key")
//!     .authenticator(|credentials: &Value| {
//!         if credentials["password"] == "admin" {
//!             Ok(json!("admin"))
//!         } else {
//!             Err(AuthenticationError::FailedAuthentication)
//!         }
//!     })
//!     .build()
//!     .await?;
//!
//! let grant = engine.login(&json!({"username": "admin", "password": "admin"})).await?;
//!
//! let request = http::Request::builder()
//!     .uri("/me")
//!     .header("Authorization", format!("Bearer {}", grant.pair.access_token))
//!     .body(Vec::new())
//!     .unwrap();
//! let validated = engine.validate(&RequestContext::from_request(&request)).await?;
//! assert_eq!(validated.identity, Some(json!("admin")));
//!
//! let rotated = engine.refresh_token_pair(&grant.pair.refresh_token).await?;
//! assert_ne!(rotated.refresh_token, grant.pair.refresh_token);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `redis-store` - Redis-backed refresh token store with optional local cache

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod builder;
pub mod callbacks;
pub mod claims;
pub mod codec;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod keys;
pub mod types;

pub use builder::SessionEngineBuilder;
pub use callbacks::{Authenticator, Authorizer, IdentityHandler, PayloadFn, TimeoutFn};
pub use claims::{AccessClaims, ORIG_IAT};
pub use codec::{IssuedToken, TokenCodec};
pub use config::SessionConfig;
pub use cookie::{CookieConfig, SameSite, SetCookie};
pub use engine::SessionEngine;
pub use error::{
    AuthenticationError, ConfigError, ExtractError, KeyError, SessionError, SessionResult,
    TokenError,
};
pub use extractor::{RequestContext, TokenLookup, TokenSource};
pub use keys::{KeyConfig, KeyManager, KeyResolver, SigningAlgorithm, SigningKey};
pub use types::{LogoutOutcome, SessionGrant, TokenPair, ValidatedRequest};

pub use sessiongate_store::{
    Clock, ManualClock, RedisConfig, RefreshTokenStore, StoreBackend, StoreConfig, StoreError,
    SystemClock, spawn_cleanup,
};

//! The session lifecycle
//!
//! ```text
//! login ──► Issued ──► Active ──► (access expired) ──► refresh ──► Rotated
//!                        │                                            │
//!                        └──────────────── logout ◄───────────────────┘
//!                                             │
//!                                          Revoked
//! ```
//!
//! Refresh consumes the presented refresh token with an atomic `take`, so of
//! two concurrent refreshes with the same token at most one succeeds. The
//! loser sees [`SessionError::RefreshTokenNotFound`].
//!
//! Revocation only prevents future rotation. Access tokens already issued
//! stay valid until their own expiry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::TimeDelta;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sessiongate_store::{Clock, RefreshTokenStore, StoreBackend};
use tracing::{debug, info, warn};

use crate::callbacks::{Authenticator, Authorizer, IdentityHandler, PayloadFn, TimeoutFn};
use crate::claims::AccessClaims;
use crate::codec::{IssuedToken, TokenCodec};
use crate::config::SessionConfig;
use crate::cookie::SetCookie;
use crate::error::{SessionError, SessionResult, TokenError};
use crate::extractor::{RequestContext, TokenLookup};
use crate::types::{LogoutOutcome, SessionGrant, TOKEN_TYPE_BEARER, TokenPair, ValidatedRequest};

/// Bytes of entropy in a refresh token
pub const REFRESH_TOKEN_BYTES: usize = 32;

/// What the store keeps for each refresh token
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    user_data: Value,
    orig_iat: i64,
}

/// Issues, validates, rotates and revokes sessions
///
/// Cheap to clone; clones share the store, keys and callbacks. Build one with
/// [`SessionEngine::builder`].
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

pub(crate) struct EngineInner {
    pub(crate) config: SessionConfig,
    pub(crate) codec: TokenCodec,
    pub(crate) store: Arc<dyn RefreshTokenStore>,
    pub(crate) token_lookup: TokenLookup,
    pub(crate) refresh_token_lookup: TokenLookup,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) payload: PayloadFn,
    pub(crate) identity_handler: IdentityHandler,
    pub(crate) authorizer: Authorizer,
    pub(crate) timeout: TimeoutFn,
    pub(crate) random: SystemRandom,
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("realm", &self.inner.config.realm)
            .field("algorithm", &self.inner.codec.algorithm())
            .field("token_lookup", &self.inner.token_lookup.to_string())
            .field("store", &self.inner.store.backend())
            .field("has_authenticator", &self.inner.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    pub(crate) fn from_inner(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start configuring an engine
    pub fn builder() -> crate::builder::SessionEngineBuilder {
        crate::builder::SessionEngineBuilder::new()
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Refresh token store in use, possibly the in-memory fallback
    pub fn store(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.inner.store
    }

    /// Backend actually serving refresh tokens
    pub fn store_backend(&self) -> StoreBackend {
        self.inner.store.backend()
    }

    /// Clock used for issuance, expiry and refresh window checks
    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.inner.codec.clock()
    }

    /// `WWW-Authenticate` value for failed requests
    pub fn www_authenticate(&self) -> String {
        format!("JWT realm=\"{}\"", self.inner.config.realm)
    }

    /// Authenticate `credentials` and open a new session
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingAuthenticator`] when none is configured
    /// - [`SessionError::Authentication`] when the authenticator refuses
    /// - store and signing failures while issuing the pair
    pub async fn login(&self, credentials: &Value) -> SessionResult<SessionGrant> {
        let authenticator = self
            .inner
            .authenticator
            .as_ref()
            .ok_or(SessionError::MissingAuthenticator)?;

        let user_data = match authenticator.authenticate(credentials).await {
            Ok(user_data) => user_data,
            Err(error) => {
                debug!(error = %error, "Login rejected");
                return Err(error.into());
            }
        };

        let pair = self.issue_pair(user_data, None).await?;
        debug!(expires_at = %pair.expires_at, "Login succeeded");
        Ok(self.grant(pair))
    }

    /// Authenticate a request by its access token
    ///
    /// Expired tokens are rejected here; refreshing is a separate call.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Extract`] when no token is found
    /// - [`SessionError::Token`] when verification fails (check
    ///   [`SessionError::is_token_expired`] to tell expiry apart)
    /// - [`SessionError::Forbidden`] when the authorizer refuses
    pub async fn validate(&self, request: &RequestContext) -> SessionResult<ValidatedRequest> {
        let head_name = &self.inner.config.token_head_name;
        let token = self.inner.token_lookup.extract(request, head_name)?;
        let claims = self.inner.codec.verify(&token)?;

        let identity = (self.inner.identity_handler)(&claims);
        if !(self.inner.authorizer)(identity.as_ref(), request) {
            debug!(method = %request.method(), path = request.uri().path(), "Request forbidden by authorizer");
            return Err(SessionError::Forbidden);
        }

        let authorization = self
            .inner
            .config
            .send_authorization
            .then(|| format!("{head_name} {token}"));

        Ok(ValidatedRequest {
            claims,
            identity,
            token,
            authorization,
        })
    }

    /// Verify a raw access token outside of any request
    ///
    /// # Errors
    ///
    /// [`SessionError::Token`] for any verification failure.
    pub fn parse_token(&self, token: &str) -> SessionResult<AccessClaims> {
        Ok(self.inner.codec.verify(token)?)
    }

    /// Claims of the request's access token if its session may still be refreshed
    ///
    /// The token may be expired; only the signature and refresh window count.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Extract`] when no access token is found
    /// - [`SessionError::ExpiredToken`] when the refresh window has closed
    /// - [`SessionError::Token`] for any other verification failure
    pub fn check_refreshable(&self, request: &RequestContext) -> SessionResult<AccessClaims> {
        let token = self
            .inner
            .token_lookup
            .extract(request, &self.inner.config.token_head_name)?;
        let claims = self.verify_allowing_expiry(&token)?;
        self.ensure_within_refresh_window(claims.orig_iat())?;
        Ok(claims)
    }

    /// Rotate the request's refresh token into a new pair
    ///
    /// When the request also carries an access token it must verify (expiry
    /// aside) and its session must be inside the refresh window.
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingRefreshToken`] when no refresh token is presented
    /// - [`SessionError::ExpiredToken`] past the refresh window
    /// - [`SessionError::RefreshTokenNotFound`] for unknown, used or revoked tokens
    /// - [`SessionError::Token`] for a presented access token that fails verification
    pub async fn refresh(&self, request: &RequestContext) -> SessionResult<SessionGrant> {
        let refresh_token = self.extract_refresh_token(request)?;

        match self
            .inner
            .token_lookup
            .extract(request, &self.inner.config.token_head_name)
        {
            Ok(access_token) => {
                let claims = self.verify_allowing_expiry(&access_token)?;
                self.ensure_within_refresh_window(claims.orig_iat())?;
            }
            Err(error) => debug!(reason = %error, "Refreshing without an access token"),
        }

        let pair = self.rotate(&refresh_token).await?;
        Ok(self.grant(pair))
    }

    /// Revoke the request's refresh token and clear delivered cookies
    ///
    /// Succeeds whether or not a refresh token is presented or still stored.
    ///
    /// # Errors
    ///
    /// Only store backend failures.
    pub async fn logout(&self, request: &RequestContext) -> SessionResult<LogoutOutcome> {
        let revoked = match self.extract_refresh_token(request) {
            Ok(token) => {
                self.revoke_refresh_token(&token).await?;
                true
            }
            Err(_) => false,
        };

        debug!(revoked, "Logout");
        Ok(LogoutOutcome {
            revoked,
            cookies: self.clearing_cookies(),
        })
    }

    /// Sign an access token for `user_data` without creating a refresh token
    ///
    /// # Errors
    ///
    /// Signing or key resolution failures.
    pub fn generate_access_token(&self, user_data: &Value) -> SessionResult<IssuedToken> {
        let claims = (self.inner.payload)(user_data);
        let ttl = (self.inner.timeout)(&claims);
        Ok(self.inner.codec.issue(claims, ttl)?)
    }

    /// Open a session for `user_data` without authenticating
    ///
    /// # Errors
    ///
    /// Signing, randomness or store failures.
    pub async fn generate_token_pair(&self, user_data: Value) -> SessionResult<TokenPair> {
        self.issue_pair(user_data, None).await
    }

    /// Rotate `refresh_token` into a new pair
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingRefreshToken`] for an empty token
    /// - [`SessionError::RefreshTokenNotFound`] for unknown, used or revoked tokens
    /// - [`SessionError::ExpiredToken`] past the refresh window
    pub async fn refresh_token_pair(&self, refresh_token: &str) -> SessionResult<TokenPair> {
        if refresh_token.is_empty() {
            return Err(SessionError::MissingRefreshToken);
        }
        self.rotate(refresh_token).await
    }

    /// Delete a refresh token; absent tokens are not an error
    ///
    /// # Errors
    ///
    /// Only store backend failures.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> SessionResult<()> {
        if refresh_token.is_empty() {
            return Ok(());
        }
        self.inner.store.delete(refresh_token).await?;
        Ok(())
    }

    /// The refresh token presented with `request`
    ///
    /// Looked up with the refresh lookup, by default the refresh cookie, then
    /// form field, JSON field and query parameter `refresh_token`.
    ///
    /// # Errors
    ///
    /// [`SessionError::MissingRefreshToken`] when no source yields one.
    pub fn extract_refresh_token(&self, request: &RequestContext) -> SessionResult<String> {
        self.inner
            .refresh_token_lookup
            .extract(request, &self.inner.config.token_head_name)
            .map_err(|_| SessionError::MissingRefreshToken)
    }

    /// Cookies delivering `pair`, empty unless cookie delivery is on
    pub fn cookies_for(&self, pair: &TokenPair) -> Vec<SetCookie> {
        let cookies = &self.inner.config.cookies;
        if !cookies.send_cookie {
            return Vec::new();
        }

        let access_lifetime = Duration::from_secs(pair.expires_in(pair.created_at));
        vec![
            cookies.access_cookie(&pair.access_token, access_lifetime),
            cookies.refresh_cookie(&pair.refresh_token, self.inner.config.refresh_token_ttl),
        ]
    }

    /// Cookies removing both tokens, empty unless cookie delivery is on
    pub fn clearing_cookies(&self) -> Vec<SetCookie> {
        let cookies = &self.inner.config.cookies;
        if cookies.send_cookie {
            cookies.clearing_cookies()
        } else {
            Vec::new()
        }
    }

    fn grant(&self, pair: TokenPair) -> SessionGrant {
        let cookies = self.cookies_for(&pair);
        SessionGrant { pair, cookies }
    }

    fn verify_allowing_expiry(&self, token: &str) -> SessionResult<AccessClaims> {
        match self.inner.codec.verify(token) {
            Ok(claims) => Ok(claims),
            Err(TokenError::Expired { claims }) => Ok(*claims),
            Err(error) => Err(error.into()),
        }
    }

    fn ensure_within_refresh_window(&self, orig_iat: Option<i64>) -> SessionResult<()> {
        let orig_iat = orig_iat.ok_or_else(|| TokenError::Invalid("missing orig_iat claim".to_string()))?;

        let max_refresh = i64::try_from(self.inner.config.max_refresh.as_secs()).unwrap_or(i64::MAX);
        let earliest = self.clock().now().timestamp().saturating_sub(max_refresh);
        if orig_iat < earliest {
            debug!(orig_iat, earliest, "Session is past its refresh window");
            return Err(SessionError::ExpiredToken);
        }
        Ok(())
    }

    async fn rotate(&self, refresh_token: &str) -> SessionResult<TokenPair> {
        let record = self.inner.store.take(refresh_token).await.map_err(|error| {
            let error = SessionError::from(error);
            if !matches!(error, SessionError::RefreshTokenNotFound) {
                warn!(error = %error, "Refresh token store failed during rotation");
            }
            error
        })?;

        let session: SessionRecord = serde_json::from_value(record.user_data)
            .map_err(|e| SessionError::Internal(format!("corrupt session record: {e}")))?;
        self.ensure_within_refresh_window(Some(session.orig_iat))?;

        let pair = self.issue_pair(session.user_data, Some(session.orig_iat)).await?;
        debug!(orig_iat = session.orig_iat, "Rotated refresh token");
        Ok(pair)
    }

    async fn issue_pair(&self, user_data: Value, orig_iat: Option<i64>) -> SessionResult<TokenPair> {
        let claims = (self.inner.payload)(&user_data);
        let ttl = (self.inner.timeout)(&claims);
        let issued = match orig_iat {
            Some(orig_iat) => self.inner.codec.issue_with_orig_iat(claims, ttl, orig_iat)?,
            None => self.inner.codec.issue(claims, ttl)?,
        };

        let refresh_token = self.new_refresh_token()?;
        let refresh_ttl = TimeDelta::from_std(self.inner.config.refresh_token_ttl)
            .map_err(|_| SessionError::Internal("refresh token lifetime out of range".to_string()))?;
        let refresh_expiry = issued
            .issued_at
            .checked_add_signed(refresh_ttl)
            .ok_or_else(|| SessionError::Internal("refresh token expiry out of range".to_string()))?;

        let record = serde_json::to_value(SessionRecord {
            user_data,
            orig_iat: issued.orig_iat,
        })
        .map_err(|e| SessionError::Internal(format!("failed to encode session record: {e}")))?;
        self.inner.store.set(&refresh_token, record, refresh_expiry).await?;

        Ok(TokenPair {
            access_token: issued.token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            refresh_token,
            expires_at: issued.expires_at,
            created_at: issued.issued_at,
        })
    }

    fn new_refresh_token(&self) -> SessionResult<String> {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        self.inner
            .random
            .fill(&mut bytes)
            .map_err(|_| SessionError::Internal("failed to generate refresh token".to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

impl SessionEngine {
    pub(crate) fn log_ready(&self) {
        info!(
            realm = %self.inner.config.realm,
            algorithm = %self.inner.codec.algorithm(),
            key_resolver = self.inner.codec.uses_resolver(),
            token_lookup = %self.inner.token_lookup,
            store = %self.inner.store.backend(),
            "Session engine initialized"
        );
    }
}

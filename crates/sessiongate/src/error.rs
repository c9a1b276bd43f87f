//! Error types for the session engine
//!
//! Each layer has its own error enum so callers can match on the exact
//! failure. [`SessionError`] aggregates them and maps every case to an HTTP
//! status, leaving response rendering to the caller.

use std::path::PathBuf;

use http::StatusCode;
use sessiongate_store::StoreError;
use thiserror::Error;

use crate::claims::AccessClaims;

/// Result type for session engine operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Key material errors, raised while the engine initializes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Symmetric algorithm configured without a secret
    #[error("secret key is required")]
    MissingSecretKey,

    /// Algorithm name not recognized, or unusable with the supplied material
    #[error("invalid signing algorithm: {0}")]
    InvalidSigningAlgorithm(String),

    /// Asymmetric algorithm configured without a private key
    #[error("private key is required")]
    MissingPrivateKey,

    /// Asymmetric algorithm configured without a public key
    #[error("public key is required")]
    MissingPublicKey,

    /// The private key file could not be read
    #[error("private key file unreadable: {path}: {reason}")]
    PrivateKeyUnreadable { path: PathBuf, reason: String },

    /// The private key content could not be parsed or decrypted
    #[error("private key invalid: {0}")]
    InvalidPrivateKey(String),

    /// The public key file could not be read
    #[error("public key file unreadable: {path}: {reason}")]
    PublicKeyUnreadable { path: PathBuf, reason: String },

    /// The public key content could not be parsed
    #[error("public key invalid: {0}")]
    InvalidPublicKey(String),

    /// A caller-supplied key resolver declined to provide a key
    #[error("key resolution failed: {0}")]
    Resolution(String),
}

impl KeyError {
    /// Whether the error comes from the filesystem rather than key content
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            KeyError::PrivateKeyUnreadable { .. } | KeyError::PublicKeyUnreadable { .. }
        )
    }
}

/// Access token encoding and verification errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    /// Signature valid, but the expiry instant has passed
    #[error("token is expired")]
    Expired {
        /// Verified claims of the expired token, still usable for refresh
        claims: Box<AccessClaims>,
    },

    /// The expiry claim is present but not a number
    #[error("{field} must be a numeric timestamp")]
    MalformedExpiryField { field: String },

    /// The expiry claim is absent
    #[error("missing {field} field")]
    MissingExpiryField { field: String },

    /// The token header names a different algorithm than the engine uses
    #[error("invalid signing algorithm: expected {expected}, token uses {found}")]
    AlgorithmMismatch { expected: String, found: String },

    /// Bad signature, malformed structure or unusable claims
    #[error("token is invalid: {0}")]
    Invalid(String),

    /// The token could not be signed
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// No key was available for signing or verification
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Token extraction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The configured header is absent or empty
    #[error("auth header is empty")]
    EmptyAuthHeader,

    /// The header lacks the expected `<HeadName> <token>` shape
    #[error("auth header is invalid")]
    InvalidAuthHeader,

    /// The configured query parameter is absent or empty
    #[error("query token is empty")]
    EmptyQueryToken,

    /// The configured cookie is absent or empty
    #[error("cookie token is empty")]
    EmptyCookieToken,

    /// The configured path parameter or form field is absent or empty
    #[error("parameter token is empty")]
    EmptyParamToken,

    /// The configured JSON body field is absent or empty
    #[error("body token is empty")]
    EmptyBodyToken,

    /// The lookup has no sources to try
    #[error("no token sources configured")]
    NoTokenSources,

    /// A lookup rule could not be parsed
    #[error("invalid token lookup rule '{0}'")]
    InvalidLookup(String),
}

/// Errors an authenticator reports for rejected credentials
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// Required credential fields are absent
    #[error("missing username or password")]
    MissingLoginValues,

    /// Credentials did not match
    #[error("incorrect username or password")]
    FailedAuthentication,

    /// Any other refusal, with a caller-supplied reason
    #[error("{0}")]
    Rejected(String),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A setting has an unusable value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Every failure the session engine can return
#[derive(Error, Debug)]
pub enum SessionError {
    /// Key material could not be resolved
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Access token could not be issued or verified
    #[error(transparent)]
    Token(#[from] TokenError),

    /// No usable token was found in the request
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The authenticator rejected the credentials
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// Engine settings are unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Login was attempted without an authenticator configured
    #[error("authenticator is not configured")]
    MissingAuthenticator,

    /// The authorizer refused the request
    #[error("you don't have permission to access this resource")]
    Forbidden,

    /// The session is past its maximum refresh window
    #[error("token is expired beyond the refresh window")]
    ExpiredToken,

    /// No refresh token was presented
    #[error("refresh token is required")]
    MissingRefreshToken,

    /// The refresh token is unknown, revoked, already used or expired
    #[error("refresh token not found or expired")]
    RefreshTokenNotFound,

    /// The refresh token store failed
    #[error(transparent)]
    Store(StoreError),

    /// An internal invariant failed (randomness, corrupt session record)
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for SessionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => SessionError::RefreshTokenNotFound,
            other => SessionError::Store(other),
        }
    }
}

impl SessionError {
    /// HTTP status a caller should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::Extract(ExtractError::NoTokenSources | ExtractError::InvalidLookup(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SessionError::Extract(_) | SessionError::MissingRefreshToken => StatusCode::BAD_REQUEST,
            SessionError::Token(
                TokenError::MalformedExpiryField { .. } | TokenError::MissingExpiryField { .. },
            ) => StatusCode::BAD_REQUEST,
            SessionError::Token(TokenError::Signing(_) | TokenError::Key(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            SessionError::Token(_)
            | SessionError::Authentication(_)
            | SessionError::ExpiredToken
            | SessionError::RefreshTokenNotFound => StatusCode::UNAUTHORIZED,
            SessionError::Forbidden => StatusCode::FORBIDDEN,
            SessionError::Store(error) if error.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Key(_)
            | SessionError::Config(_)
            | SessionError::MissingAuthenticator
            | SessionError::Store(_)
            | SessionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the same call may succeed if retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Store(error) if error.is_transient())
    }

    /// Whether the access token was rejected only because it expired
    pub fn is_token_expired(&self) -> bool {
        matches!(self, SessionError::Token(TokenError::Expired { .. }))
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::Key(_) => "key_material",
            SessionError::Token(TokenError::Expired { .. }) => "token_expired",
            SessionError::Token(TokenError::MalformedExpiryField { .. }) => "malformed_expiry",
            SessionError::Token(TokenError::MissingExpiryField { .. }) => "missing_expiry",
            SessionError::Token(TokenError::AlgorithmMismatch { .. }) => "algorithm_mismatch",
            SessionError::Token(TokenError::Invalid(_)) => "token_invalid",
            SessionError::Token(TokenError::Signing(_)) => "token_signing",
            SessionError::Token(TokenError::Key(_)) => "key_material",
            SessionError::Extract(_) => "token_extraction",
            SessionError::Authentication(_) => "authentication",
            SessionError::Config(_) => "configuration",
            SessionError::MissingAuthenticator => "configuration",
            SessionError::Forbidden => "forbidden",
            SessionError::ExpiredToken => "refresh_window_exceeded",
            SessionError::MissingRefreshToken => "missing_refresh_token",
            SessionError::RefreshTokenNotFound => "refresh_token_not_found",
            SessionError::Store(_) => "store",
            SessionError::Internal(_) => "internal",
        }
    }
}

//! Values returned by the session engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::AccessClaims;
use crate::cookie::SetCookie;

/// Token type label for issued pairs
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Access token plus its refresh token
///
/// Serializes as
/// `{access_token, token_type, refresh_token, expires_at, created_at}` with
/// epoch-second timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,

    /// Always `"Bearer"`
    pub token_type: String,

    /// Opaque refresh token
    pub refresh_token: String,

    /// Access token expiry
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// Issuance instant
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl TokenPair {
    /// Seconds until the access token expires, zero once expired
    pub fn expires_in(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }
}

/// Result of a login or refresh
#[derive(Debug, Clone)]
pub struct SessionGrant {
    /// Newly issued pair
    pub pair: TokenPair,
    /// Cookies to set; empty unless cookie delivery is enabled
    pub cookies: Vec<SetCookie>,
}

/// Result of a logout
#[derive(Debug, Clone)]
pub struct LogoutOutcome {
    /// Whether a refresh token was presented and revoked
    pub revoked: bool,
    /// Cookies to clear; empty unless cookie delivery is enabled
    pub cookies: Vec<SetCookie>,
}

/// A request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Verified claims
    pub claims: AccessClaims,
    /// Identity derived from the claims
    pub identity: Option<Value>,
    /// The raw access token
    pub token: String,
    /// `Authorization` value to echo back, when enabled
    pub authorization: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_pair_wire_shape() {
        let pair = TokenPair {
            access_token: "a.b.c".to_string(),
            token_type: TOKEN_TYPE_BEARER.to_string(),
            refresh_token: "rt".to_string(),
            expires_at: DateTime::from_timestamp(1_700_003_600, 0).unwrap(),
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        assert_eq!(
            serde_json::to_value(&pair).unwrap(),
            json!({
                "access_token": "a.b.c",
                "token_type": "Bearer",
                "refresh_token": "rt",
                "expires_at": 1_700_003_600,
                "created_at": 1_700_000_000,
            })
        );
        assert_eq!(pair.expires_in(pair.created_at), 3600);
        assert_eq!(pair.expires_in(pair.expires_at + chrono::Duration::seconds(5)), 0);
    }
}

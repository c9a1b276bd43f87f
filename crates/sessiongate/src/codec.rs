//! Access token encoding and verification
//!
//! [`TokenCodec::verify`] checks, in order:
//!
//! 1. the header parses and names the configured algorithm
//! 2. the signature is valid for the resolved key
//! 3. the expiry claim exists, is numeric, and lies in the future
//!
//! Expiry is checked here against the injected [`Clock`] rather than by
//! `jsonwebtoken`, so an expired token still yields its verified claims
//! (needed for refresh) and tests control time precisely.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Header, Validation, decode, decode_header, encode};
use serde_json::Value;
use sessiongate_store::{Clock, SystemClock};
use tracing::{debug, trace};

use crate::claims::{AccessClaims, DEFAULT_EXPIRY_FIELD, ORIG_IAT, numeric_seconds};
use crate::error::TokenError;
use crate::keys::{KeyManager, SigningAlgorithm};

/// A freshly signed access token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWT
    pub token: String,
    /// Absolute expiry
    pub expires_at: DateTime<Utc>,
    /// Issuance instant
    pub issued_at: DateTime<Utc>,
    /// Original issue time of the session (epoch seconds)
    pub orig_iat: i64,
    /// Claims exactly as signed
    pub claims: AccessClaims,
}

/// Signs and verifies access tokens
#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: KeyManager,
    expiry_field: String,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Codec using the system clock and the `exp` claim
    pub fn new(keys: KeyManager) -> Self {
        Self {
            keys,
            expiry_field: DEFAULT_EXPIRY_FIELD.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Judge expiry with `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Store the expiry under `field` instead of `exp`
    pub fn with_expiry_field(mut self, field: impl Into<String>) -> Self {
        self.expiry_field = field.into();
        self
    }

    /// Active signing algorithm
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.keys.algorithm()
    }

    /// Whether keys come from a caller-supplied resolver
    pub fn uses_resolver(&self) -> bool {
        self.keys.uses_resolver()
    }

    /// Claim name carrying the expiry
    pub fn expiry_field(&self) -> &str {
        &self.expiry_field
    }

    /// Clock used for issuance and expiry checks
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sign `claims` for `ttl`, starting a new session
    ///
    /// # Errors
    ///
    /// [`TokenError::Key`] if no signing key is available and
    /// [`TokenError::Signing`] if encoding fails.
    pub fn issue(&self, claims: AccessClaims, ttl: Duration) -> Result<IssuedToken, TokenError> {
        let now = self.clock.now();
        self.sign(claims, ttl, now, now.timestamp())
    }

    /// Sign `claims` for `ttl`, continuing a session that began at `orig_iat`
    ///
    /// # Errors
    ///
    /// Same as [`TokenCodec::issue`].
    pub fn issue_with_orig_iat(
        &self,
        claims: AccessClaims,
        ttl: Duration,
        orig_iat: i64,
    ) -> Result<IssuedToken, TokenError> {
        self.sign(claims, ttl, self.clock.now(), orig_iat)
    }

    fn sign(
        &self,
        mut claims: AccessClaims,
        ttl: Duration,
        now: DateTime<Utc>,
        orig_iat: i64,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|_| TokenError::Signing(format!("token lifetime {ttl:?} out of range")))?;
        let issued_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing("token expiry out of range".to_string()))?;

        // Reserved claims override anything the payload supplied
        claims.insert(self.expiry_field.clone(), expires_at.timestamp());
        claims.insert(ORIG_IAT, orig_iat);

        let signing_key = self.keys.signing_key(&claims)?;
        let mut header = Header::new(self.algorithm().as_jwt());
        header.kid = signing_key.kid;

        let token = encode(&header, &claims, &signing_key.key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        trace!(algorithm = %self.algorithm(), expires_at = %expires_at, "Issued access token");

        Ok(IssuedToken {
            token,
            expires_at,
            issued_at,
            orig_iat,
            claims,
        })
    }

    /// Verify a token and return its claims
    ///
    /// # Errors
    ///
    /// - [`TokenError::AlgorithmMismatch`] when the header names another algorithm
    /// - [`TokenError::Invalid`] for malformed tokens or bad signatures
    /// - [`TokenError::MissingExpiryField`] / [`TokenError::MalformedExpiryField`]
    /// - [`TokenError::Expired`] (carrying the verified claims) once expired
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let header = self.decode_header(token)?;

        let expected = self.algorithm();
        if header.alg != expected.as_jwt() {
            debug!(expected = %expected, found = ?header.alg, "Rejected token with unexpected algorithm");
            return Err(TokenError::AlgorithmMismatch {
                expected: expected.to_string(),
                found: format!("{:?}", header.alg),
            });
        }

        let decoding_key = self.keys.verification_key(&header)?;

        let mut validation = Validation::new(expected.as_jwt());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let claims = decode::<AccessClaims>(token, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::Invalid("signature is invalid".to_string()),
                _ => TokenError::Invalid(e.to_string()),
            })?
            .claims;

        let expiry = match claims.get(&self.expiry_field) {
            None | Some(Value::Null) => {
                return Err(TokenError::MissingExpiryField {
                    field: self.expiry_field.clone(),
                });
            }
            Some(value) => numeric_seconds(value).ok_or_else(|| TokenError::MalformedExpiryField {
                field: self.expiry_field.clone(),
            })?,
        };

        if self.clock.now().timestamp() >= expiry {
            return Err(TokenError::Expired {
                claims: Box::new(claims),
            });
        }

        Ok(claims)
    }

    /// Parse the token header without verifying anything
    ///
    /// # Errors
    ///
    /// [`TokenError::Invalid`] when the header cannot be decoded.
    pub fn decode_header(&self, token: &str) -> Result<Header, TokenError> {
        decode_header(token).map_err(|e| TokenError::Invalid(format!("invalid token header: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sessiongate_store::ManualClock;
    use serde_json::json;

    fn codec_with_clock(secret: &[u8]) -> (TokenCodec, ManualClock) {
        let clock = ManualClock::starting_now();
        let keys = KeyManager::from_secret(SigningAlgorithm::HS256, secret).unwrap();
        (TokenCodec::new(keys).with_clock(Arc::new(clock.clone())), clock)
    }

    fn sign_raw(claims: &Value, algorithm: jsonwebtoken::Algorithm, secret: &[u8]) -> String {
        encode(
            &Header::new(algorithm),
            claims,
            &jsonwebtoken::EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_then_verify_preserves_claims() {
        let (codec, clock) = codec_with_clock(b"secret key");
        let claims = AccessClaims::new().with("identity", "admin").with("role", "ops");

        let issued = codec.issue(claims.clone(), Duration::from_secs(3600)).unwrap();
        assert_eq!(issued.orig_iat, clock.now().timestamp());
        assert_eq!(issued.expires_at.timestamp(), clock.now().timestamp() + 3600);

        let verified = codec.verify(&issued.token).unwrap();
        assert_eq!(verified.without_timing("exp"), claims);
        assert_eq!(verified.orig_iat(), Some(issued.orig_iat));
    }

    #[test]
    fn test_reserved_claims_override_payload() {
        let (codec, clock) = codec_with_clock(b"secret key");
        let claims = AccessClaims::new().with("exp", 1).with(ORIG_IAT, 2);

        let issued = codec.issue(claims, Duration::from_secs(60)).unwrap();
        let verified = codec.verify(&issued.token).unwrap();
        assert_eq!(verified.get("exp"), Some(&json!(clock.now().timestamp() + 60)));
        assert_eq!(verified.orig_iat(), Some(clock.now().timestamp()));
    }

    #[test]
    fn test_expired_token_carries_claims() {
        let (codec, clock) = codec_with_clock(b"secret key");
        let issued = codec
            .issue(AccessClaims::new().with("identity", "bob"), Duration::from_secs(60))
            .unwrap();

        clock.advance(Duration::from_secs(60));

        match codec.verify(&issued.token) {
            Err(TokenError::Expired { claims }) => {
                assert_eq!(claims.get("identity"), Some(&json!("bob")));
            }
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_expiry_field() {
        let (codec, _clock) = codec_with_clock(b"secret key");
        let codec = codec.with_expiry_field("expires");

        let issued = codec.issue(AccessClaims::new(), Duration::from_secs(60)).unwrap();
        let verified = codec.verify(&issued.token).unwrap();
        assert_eq!(codec.expiry_field(), "expires");
        assert_eq!(
            verified.get(codec.expiry_field()),
            Some(&Value::from(issued.expires_at.timestamp()))
        );
        assert!(!verified.contains("exp"));
    }

    #[test]
    fn test_missing_and_malformed_expiry() {
        let (codec, _clock) = codec_with_clock(b"secret key");

        let no_exp = sign_raw(&json!({"identity": "x"}), jsonwebtoken::Algorithm::HS256, b"secret key");
        assert_eq!(
            codec.verify(&no_exp).unwrap_err(),
            TokenError::MissingExpiryField {
                field: "exp".to_string()
            }
        );

        let text_exp = sign_raw(&json!({"exp": "tomorrow"}), jsonwebtoken::Algorithm::HS256, b"secret key");
        assert_eq!(
            codec.verify(&text_exp).unwrap_err(),
            TokenError::MalformedExpiryField {
                field: "exp".to_string()
            }
        );
    }

    #[test]
    fn test_algorithm_mismatch_detected_before_signature() {
        let (codec, clock) = codec_with_clock(b"secret key");
        let exp = clock.now().timestamp() + 60;
        let hs512 = sign_raw(&json!({"exp": exp}), jsonwebtoken::Algorithm::HS512, b"secret key");

        assert!(matches!(
            codec.verify(&hs512),
            Err(TokenError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let (codec, clock) = codec_with_clock(b"secret key");
        let exp = clock.now().timestamp() + 60;
        let forged = sign_raw(&json!({"exp": exp}), jsonwebtoken::Algorithm::HS256, b"other key");

        assert!(matches!(codec.verify(&forged), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let (codec, _clock) = codec_with_clock(b"secret key");
        assert!(matches!(codec.verify("not.a.jwt"), Err(TokenError::Invalid(_))));
        assert!(matches!(codec.verify(""), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_issue_with_orig_iat_carries_session_start() {
        let (codec, clock) = codec_with_clock(b"secret key");
        let start = clock.now().timestamp();
        clock.advance(Duration::from_secs(7200));

        let issued = codec
            .issue_with_orig_iat(AccessClaims::new(), Duration::from_secs(60), start)
            .unwrap();
        assert_eq!(issued.orig_iat, start);
        assert_eq!(codec.verify(&issued.token).unwrap().orig_iat(), Some(start));
    }

    proptest::proptest! {
        #[test]
        fn prop_payload_claims_survive_signing(
            payload in proptest::collection::btree_map("[a-z_]{1,10}", "[ -~]{0,24}", 0..8)
        ) {
            let (codec, _clock) = codec_with_clock(b"secret key");
            let claims: AccessClaims = payload
                .iter()
                .map(|(name, value)| (name.clone(), json!(value)))
                .collect();

            let issued = codec.issue(claims, Duration::from_secs(60)).unwrap();
            let verified = codec.verify(&issued.token).unwrap();

            for (name, value) in &payload {
                if name == "exp" || name == ORIG_IAT {
                    continue;
                }
                proptest::prop_assert_eq!(verified.get(name), Some(&json!(value)));
            }
        }
    }
}

//! Signing and verification key material
//!
//! One algorithm is active per engine. Symmetric algorithms use a shared
//! secret; asymmetric ones load a PEM private key (optionally a
//! passphrase-protected PKCS#8 RSA key) and a PEM public key. Key files take
//! precedence over inline key text, and the private key is resolved before the
//! public key.
//!
//! A [`KeyResolver`] replaces all of the above: the engine then asks the
//! resolver for a key on every issuance and verification, which supports key
//! rotation and per-tenant keys through the `kid` header.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString, SecretVec};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::claims::AccessClaims;
use crate::error::KeyError;

/// Signing algorithms the engine can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256
    #[default]
    HS256,
    /// HMAC with SHA-384
    HS384,
    /// HMAC with SHA-512
    HS512,
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512,
    /// RSASSA-PSS with SHA-256
    PS256,
    /// RSASSA-PSS with SHA-384
    PS384,
    /// RSASSA-PSS with SHA-512
    PS512,
    /// ECDSA P-256 with SHA-256
    ES256,
    /// ECDSA P-384 with SHA-384
    ES384,
}

/// Key family an algorithm belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// Shared secret
    Hmac,
    /// RSA key pair
    Rsa,
    /// Elliptic curve key pair
    Ec,
}

impl SigningAlgorithm {
    /// Key family for this algorithm
    pub fn family(self) -> KeyFamily {
        match self {
            SigningAlgorithm::HS256 | SigningAlgorithm::HS384 | SigningAlgorithm::HS512 => KeyFamily::Hmac,
            SigningAlgorithm::RS256
            | SigningAlgorithm::RS384
            | SigningAlgorithm::RS512
            | SigningAlgorithm::PS256
            | SigningAlgorithm::PS384
            | SigningAlgorithm::PS512 => KeyFamily::Rsa,
            SigningAlgorithm::ES256 | SigningAlgorithm::ES384 => KeyFamily::Ec,
        }
    }

    /// Whether this algorithm signs with a shared secret
    pub fn is_symmetric(self) -> bool {
        self.family() == KeyFamily::Hmac
    }

    /// The matching `jsonwebtoken` algorithm
    pub fn as_jwt(self) -> Algorithm {
        match self {
            SigningAlgorithm::HS256 => Algorithm::HS256,
            SigningAlgorithm::HS384 => Algorithm::HS384,
            SigningAlgorithm::HS512 => Algorithm::HS512,
            SigningAlgorithm::RS256 => Algorithm::RS256,
            SigningAlgorithm::RS384 => Algorithm::RS384,
            SigningAlgorithm::RS512 => Algorithm::RS512,
            SigningAlgorithm::PS256 => Algorithm::PS256,
            SigningAlgorithm::PS384 => Algorithm::PS384,
            SigningAlgorithm::PS512 => Algorithm::PS512,
            SigningAlgorithm::ES256 => Algorithm::ES256,
            SigningAlgorithm::ES384 => Algorithm::ES384,
        }
    }

    /// Canonical name, as it appears in the token header
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::HS256 => "HS256",
            SigningAlgorithm::HS384 => "HS384",
            SigningAlgorithm::HS512 => "HS512",
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
            SigningAlgorithm::ES256 => "ES256",
            SigningAlgorithm::ES384 => "ES384",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(SigningAlgorithm::HS256),
            "HS384" => Ok(SigningAlgorithm::HS384),
            "HS512" => Ok(SigningAlgorithm::HS512),
            "RS256" => Ok(SigningAlgorithm::RS256),
            "RS384" => Ok(SigningAlgorithm::RS384),
            "RS512" => Ok(SigningAlgorithm::RS512),
            "PS256" => Ok(SigningAlgorithm::PS256),
            "PS384" => Ok(SigningAlgorithm::PS384),
            "PS512" => Ok(SigningAlgorithm::PS512),
            "ES256" => Ok(SigningAlgorithm::ES256),
            "ES384" => Ok(SigningAlgorithm::ES384),
            _ => Err(KeyError::InvalidSigningAlgorithm(s.to_string())),
        }
    }
}

/// Where key material comes from
///
/// ```toml
/// [keys]
/// private_key_file = "/etc/sessiongate/signing.pem"
/// private_key_passphrase = "correct horse"
/// public_key_file = "/etc/sessiongate/signing.pub.pem"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Shared secret for HMAC algorithms
    #[serde(default, with = "optional_secret", skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretString>,

    /// PEM private key file (takes precedence over `private_key`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,

    /// Inline PEM private key
    #[serde(default, with = "optional_secret", skip_serializing_if = "Option::is_none")]
    pub private_key: Option<SecretString>,

    /// Passphrase for an encrypted PKCS#8 private key
    #[serde(default, with = "optional_secret", skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<SecretString>,

    /// PEM public key file (takes precedence over `public_key`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<PathBuf>,

    /// Inline PEM public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Key used to sign one token
#[derive(Clone)]
pub struct SigningKey {
    /// Encoding key
    pub key: EncodingKey,
    /// Key ID placed in the token header
    pub kid: Option<String>,
}

impl SigningKey {
    /// Signing key without a key ID
    pub fn new(key: EncodingKey) -> Self {
        Self { key, kid: None }
    }

    /// Signing key advertised under `kid`
    pub fn with_kid(key: EncodingKey, kid: impl Into<String>) -> Self {
        Self {
            key,
            kid: Some(kid.into()),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Caller-supplied key selection
///
/// When configured, static key loading is skipped entirely.
pub trait KeyResolver: Send + Sync + fmt::Debug {
    /// Key to sign a token carrying `claims`
    ///
    /// # Errors
    ///
    /// Return [`KeyError::Resolution`] when no key applies.
    fn signing_key(&self, claims: &AccessClaims) -> Result<SigningKey, KeyError>;

    /// Key to verify a token with this header
    ///
    /// # Errors
    ///
    /// Return [`KeyError::Resolution`] for unknown key IDs.
    fn verification_key(&self, header: &Header) -> Result<DecodingKey, KeyError>;
}

#[derive(Clone)]
enum KeySource {
    Static {
        encoding: EncodingKey,
        decoding: DecodingKey,
    },
    Resolver(Arc<dyn KeyResolver>),
}

/// Resolved key material for one signing algorithm
#[derive(Clone)]
pub struct KeyManager {
    algorithm: SigningAlgorithm,
    source: KeySource,
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            KeySource::Static { .. } => "static",
            KeySource::Resolver(_) => "resolver",
        };
        f.debug_struct("KeyManager")
            .field("algorithm", &self.algorithm)
            .field("source", &source)
            .finish()
    }
}

impl KeyManager {
    /// Keys from a shared secret
    ///
    /// # Errors
    ///
    /// [`KeyError::MissingSecretKey`] for an empty secret and
    /// [`KeyError::InvalidSigningAlgorithm`] for a non-HMAC algorithm.
    pub fn from_secret(algorithm: SigningAlgorithm, secret: &[u8]) -> Result<Self, KeyError> {
        if !algorithm.is_symmetric() {
            return Err(KeyError::InvalidSigningAlgorithm(format!(
                "{algorithm} requires a key pair, not a shared secret"
            )));
        }
        if secret.is_empty() {
            return Err(KeyError::MissingSecretKey);
        }

        Ok(Self {
            algorithm,
            source: KeySource::Static {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            },
        })
    }

    /// Keys from PEM-encoded private and public keys
    ///
    /// # Errors
    ///
    /// [`KeyError::InvalidPrivateKey`] / [`KeyError::InvalidPublicKey`] for
    /// content that does not parse (or does not decrypt with `passphrase`).
    pub fn from_pem(
        algorithm: SigningAlgorithm,
        private_pem: &[u8],
        passphrase: Option<&str>,
        public_pem: &[u8],
    ) -> Result<Self, KeyError> {
        let (encoding, decoding) = match algorithm.family() {
            KeyFamily::Hmac => {
                return Err(KeyError::InvalidSigningAlgorithm(format!(
                    "{algorithm} uses a shared secret, not a key pair"
                )));
            }
            KeyFamily::Rsa => {
                let encoding = match passphrase {
                    Some(passphrase) => decrypt_rsa_private_key(private_pem, passphrase)?,
                    None => EncodingKey::from_rsa_pem(private_pem)
                        .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?,
                };
                let decoding = DecodingKey::from_rsa_pem(public_pem)
                    .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
                (encoding, decoding)
            }
            KeyFamily::Ec => {
                if passphrase.is_some() {
                    return Err(KeyError::InvalidPrivateKey(
                        "encrypted private keys are supported for RSA algorithms only".to_string(),
                    ));
                }
                let encoding = EncodingKey::from_ec_pem(private_pem)
                    .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
                let decoding = DecodingKey::from_ec_pem(public_pem)
                    .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
                (encoding, decoding)
            }
        };

        Ok(Self {
            algorithm,
            source: KeySource::Static { encoding, decoding },
        })
    }

    /// Defer every key decision to `resolver`
    pub fn from_resolver(algorithm: SigningAlgorithm, resolver: Arc<dyn KeyResolver>) -> Self {
        Self {
            algorithm,
            source: KeySource::Resolver(resolver),
        }
    }

    /// Resolve keys for `algorithm` from configuration, reading key files
    ///
    /// # Errors
    ///
    /// Any [`KeyError`]: missing material, unreadable files, or invalid content.
    pub async fn load(algorithm: SigningAlgorithm, config: &KeyConfig) -> Result<Self, KeyError> {
        if algorithm.is_symmetric() {
            let secret = config
                .secret
                .as_ref()
                .map(|s| s.expose_secret().as_bytes())
                .unwrap_or_default();
            return Self::from_secret(algorithm, secret);
        }

        let private_pem = match (&config.private_key_file, &config.private_key) {
            (Some(path), _) => SecretVec::new(read_key_file(path).await.map_err(|reason| {
                KeyError::PrivateKeyUnreadable {
                    path: path.clone(),
                    reason,
                }
            })?),
            (None, Some(pem)) => SecretVec::new(pem.expose_secret().as_bytes().to_vec()),
            (None, None) => return Err(KeyError::MissingPrivateKey),
        };

        let public_pem = match (&config.public_key_file, &config.public_key) {
            (Some(path), _) => read_key_file(path)
                .await
                .map_err(|reason| KeyError::PublicKeyUnreadable {
                    path: path.clone(),
                    reason,
                })?,
            (None, Some(pem)) => pem.as_bytes().to_vec(),
            (None, None) => return Err(KeyError::MissingPublicKey),
        };

        let passphrase = config
            .private_key_passphrase
            .as_ref()
            .map(|p| p.expose_secret().as_str())
            .filter(|p| !p.is_empty());

        let manager = Self::from_pem(algorithm, private_pem.expose_secret(), passphrase, &public_pem)?;
        debug!(algorithm = %algorithm, encrypted = passphrase.is_some(), "Loaded asymmetric key pair");
        Ok(manager)
    }

    /// Active signing algorithm
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Whether keys come from a caller-supplied resolver
    pub fn uses_resolver(&self) -> bool {
        matches!(self.source, KeySource::Resolver(_))
    }

    /// Key for signing a token with `claims`
    ///
    /// # Errors
    ///
    /// Propagates resolver failures.
    pub fn signing_key(&self, claims: &AccessClaims) -> Result<SigningKey, KeyError> {
        match &self.source {
            KeySource::Static { encoding, .. } => Ok(SigningKey::new(encoding.clone())),
            KeySource::Resolver(resolver) => resolver.signing_key(claims),
        }
    }

    /// Key for verifying a token with `header`
    ///
    /// # Errors
    ///
    /// Propagates resolver failures.
    pub fn verification_key(&self, header: &Header) -> Result<DecodingKey, KeyError> {
        match &self.source {
            KeySource::Static { decoding, .. } => Ok(decoding.clone()),
            KeySource::Resolver(resolver) => resolver.verification_key(header),
        }
    }
}

async fn read_key_file(path: &Path) -> Result<Vec<u8>, String> {
    tokio::fs::read(path).await.map_err(|e| e.to_string())
}

/// Decrypt a PKCS#8 `ENCRYPTED PRIVATE KEY` PEM and re-encode it for signing
fn decrypt_rsa_private_key(pem: &[u8], passphrase: &str) -> Result<EncodingKey, KeyError> {
    use rsa::RsaPrivateKey;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    let pem = std::str::from_utf8(pem)
        .map_err(|_| KeyError::InvalidPrivateKey("private key PEM is not valid UTF-8".to_string()))?;
    let key = RsaPrivateKey::from_pkcs8_encrypted_pem(pem, passphrase.as_bytes())
        .map_err(|e| KeyError::InvalidPrivateKey(format!("failed to decrypt private key: {e}")))?;
    let der = key
        .to_pkcs1_der()
        .map_err(|e| KeyError::InvalidPrivateKey(format!("failed to re-encode private key: {e}")))?;

    Ok(EncodingKey::from_rsa_der(der.as_bytes()))
}

mod optional_secret {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match secret {
            Some(secret) => serializer.serialize_some(secret.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("hs256".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::HS256);
        assert_eq!(" RS512 ".parse::<SigningAlgorithm>().unwrap(), SigningAlgorithm::RS512);
        assert!(matches!(
            "none".parse::<SigningAlgorithm>(),
            Err(KeyError::InvalidSigningAlgorithm(_))
        ));
    }

    #[test]
    fn test_algorithm_families() {
        assert!(SigningAlgorithm::HS384.is_symmetric());
        assert_eq!(SigningAlgorithm::PS256.family(), KeyFamily::Rsa);
        assert_eq!(SigningAlgorithm::ES384.family(), KeyFamily::Ec);
        assert_eq!(SigningAlgorithm::RS256.as_jwt(), Algorithm::RS256);
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert_eq!(
            KeyManager::from_secret(SigningAlgorithm::HS256, b"").unwrap_err(),
            KeyError::MissingSecretKey
        );
    }

    #[test]
    fn test_secret_with_asymmetric_algorithm_rejected() {
        assert!(matches!(
            KeyManager::from_secret(SigningAlgorithm::RS256, b"secret"),
            Err(KeyError::InvalidSigningAlgorithm(_))
        ));
    }

    #[tokio::test]
    async fn test_load_symmetric_without_secret() {
        let err = KeyManager::load(SigningAlgorithm::HS512, &KeyConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, KeyError::MissingSecretKey);
    }

    #[tokio::test]
    async fn test_load_missing_private_key_file_is_io_error() {
        let config = KeyConfig {
            private_key_file: Some(PathBuf::from("/nonexistent/sessiongate/private.pem")),
            public_key: Some("unused".to_string()),
            ..KeyConfig::default()
        };
        let err = KeyManager::load(SigningAlgorithm::RS256, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::PrivateKeyUnreadable { .. }));
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_load_garbage_private_key_is_content_error() {
        let config = KeyConfig {
            private_key: Some(SecretString::new("not a pem".to_string())),
            public_key: Some("not a pem either".to_string()),
            ..KeyConfig::default()
        };
        let err = KeyManager::load(SigningAlgorithm::RS256, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::InvalidPrivateKey(_)));
    }

    #[test]
    fn test_key_config_secrets_hidden_from_debug() {
        let config = KeyConfig {
            secret: Some(SecretString::new("topsecret".to_string())),
            ..KeyConfig::default()
        };
        assert!(!format!("{config:?}").contains("topsecret"));
    }
}
